//! Rewrite target selection.
//!
//! Decides whether a JIT-compiling method is in tracing scope by matching it
//! against the configured targets. Entries are evaluated in document order and
//! methods within an entry in declaration order; the first full match wins.
//!
//! Matching is exact on assembly name, namespace-qualified class name, and method
//! name. A configured parameter list must align positionally with the rendered
//! type names of every argument; an argument count mismatch or an argument whose
//! type has no stable rendering is a non-match. An absent parameter list matches
//! any signature with that name.

use crate::{
    config::TraceConfig,
    metadata::signatures::{MethodSignature, TypeSpan},
    Result,
};

/// Returns `true` if the method is selected for tracing.
///
/// `param_type_name` renders one parameter span as a namespace-qualified type
/// name, returning `Ok(None)` for types without a stable rendering (the caller
/// typically forwards to [`crate::metadata::resolver::TypeResolver::type_name`]).
///
/// # Errors
/// Propagates failures from `param_type_name`; matching itself cannot fail.
pub fn is_in_scope<F>(
    config: &TraceConfig,
    assembly_name: &str,
    type_name: &str,
    method_name: &str,
    signature: &MethodSignature<'_>,
    mut param_type_name: F,
) -> Result<bool>
where
    F: FnMut(&TypeSpan<'_>) -> Result<Option<String>>,
{
    for entry in &config.instrumentation {
        if entry.assembly_name != assembly_name || entry.class_name != type_name {
            continue;
        }

        for method in &entry.methods {
            if method.method_name != method_name {
                continue;
            }

            let Some(wanted) = method.param_names() else {
                return Ok(true);
            };

            if wanted.len() != signature.params.len() {
                continue;
            }

            let mut all_match = true;
            for (want, span) in wanted.iter().zip(&signature.params) {
                match param_type_name(span)? {
                    Some(name) if name == *want => {}
                    _ => {
                        all_match = false;
                        break;
                    }
                }
            }
            if all_match {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::parse_method_signature;

    fn config(json: &str) -> TraceConfig {
        TraceConfig::from_json(json).unwrap()
    }

    fn render_primitive(span: &TypeSpan<'_>) -> Result<Option<String>> {
        Ok(crate::metadata::element::primitive_name(span.element_type()).map(str::to_string))
    }

    #[test]
    fn matches_without_param_list() {
        let config = config(
            r#"{"instrumentation":[{"assemblyName":"App","className":"A.B","methods":[{"methodName":"M"}]}]}"#,
        );
        // instance void M(int32)
        let sig = parse_method_signature(&[0x20, 0x01, 0x01, 0x08]).unwrap();

        assert!(is_in_scope(&config, "App", "A.B", "M", &sig, render_primitive).unwrap());
        assert!(!is_in_scope(&config, "App", "A.B", "N", &sig, render_primitive).unwrap());
        assert!(!is_in_scope(&config, "App", "A.C", "M", &sig, render_primitive).unwrap());
        assert!(!is_in_scope(&config, "Other", "A.B", "M", &sig, render_primitive).unwrap());
    }

    #[test]
    fn positional_param_match() {
        let config = config(
            r#"{"instrumentation":[{"assemblyName":"App","className":"A.B","methods":[
                {"methodName":"M","paramsName":"System.String,System.Int32"}]}]}"#,
        );

        // instance void M(string, int32)
        let matching = parse_method_signature(&[0x20, 0x02, 0x01, 0x0E, 0x08]).unwrap();
        assert!(is_in_scope(&config, "App", "A.B", "M", &matching, render_primitive).unwrap());

        // Swapped order is a non-match
        let swapped = parse_method_signature(&[0x20, 0x02, 0x01, 0x08, 0x0E]).unwrap();
        assert!(!is_in_scope(&config, "App", "A.B", "M", &swapped, render_primitive).unwrap());

        // Count mismatch is a non-match
        let fewer = parse_method_signature(&[0x20, 0x01, 0x01, 0x0E]).unwrap();
        assert!(!is_in_scope(&config, "App", "A.B", "M", &fewer, render_primitive).unwrap());
    }

    #[test]
    fn unrenderable_param_is_non_match() {
        let config = config(
            r#"{"instrumentation":[{"assemblyName":"App","className":"A.B","methods":[
                {"methodName":"M","paramsName":"System.Int32"}]}]}"#,
        );

        // instance void M(int32[]) - arrays have no stable rendering
        let sig = parse_method_signature(&[0x20, 0x01, 0x01, 0x1D, 0x08]).unwrap();
        assert!(!is_in_scope(&config, "App", "A.B", "M", &sig, render_primitive).unwrap());
    }

    #[test]
    fn first_match_wins_across_entries() {
        let config = config(
            r#"{"instrumentation":[
                {"assemblyName":"App","className":"A.B","methods":[{"methodName":"M","paramsName":"System.Int32"}]},
                {"assemblyName":"App","className":"A.B","methods":[{"methodName":"M"}]}]}"#,
        );

        // Signature that fails the first entry's param list still matches the second
        let sig = parse_method_signature(&[0x20, 0x01, 0x01, 0x0E]).unwrap();
        assert!(is_in_scope(&config, "App", "A.B", "M", &sig, render_primitive).unwrap());
    }
}
