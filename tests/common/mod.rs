//! Shared functionality for integration tests: an in-memory [`MetadataStore`]
//! that behaves like a loaded module's metadata, plus body-construction helpers.

use std::collections::HashMap;

use clrtrace::{
    metadata::{
        store::{GenericParamProps, MetadataStore, MethodProps, ParamProps},
        token::{table, Token},
    },
    Error, Result,
};

struct MethodRecord {
    props: MethodProps,
    body: Option<Vec<u8>>,
    params: Vec<ParamProps>,
    generic_params: Vec<GenericParamProps>,
}

/// In-memory metadata store. Every mutating trait method bumps `mutations`,
/// which tests use to assert that skipped rewrites touch nothing.
#[derive(Default)]
pub struct FakeStore {
    methods: HashMap<Token, MethodRecord>,
    members_by_type: HashMap<Token, Vec<(String, Token)>>,
    type_def_names: HashMap<Token, String>,
    type_defs_by_name: HashMap<String, Token>,
    type_refs: HashMap<(Token, String), Token>,
    type_ref_names: HashMap<Token, String>,
    member_refs: HashMap<(Token, String, Vec<u8>), Token>,
    assembly_refs: HashMap<String, Token>,
    user_strings: HashMap<String, Token>,
    local_sigs: HashMap<Vec<u8>, Token>,
    local_sig_blobs: HashMap<Token, Vec<u8>>,
    type_specs: HashMap<Vec<u8>, Token>,
    method_specs: HashMap<(Token, Vec<u8>), Token>,
    rows: HashMap<u8, u32>,
    /// Number of mutating store calls observed
    pub mutations: usize,
}

impl FakeStore {
    pub fn new() -> Self {
        FakeStore::default()
    }

    fn next_token(&mut self, table: u8) -> Token {
        let row = self.rows.entry(table).or_insert(0);
        *row += 1;
        Token::from_parts(table, *row)
    }

    /// Seeds a type definition.
    pub fn add_type_def(&mut self, name: &str) -> Token {
        let token = self.next_token(table::TYPE_DEF);
        self.type_def_names.insert(token, name.to_string());
        self.type_defs_by_name.insert(name.to_string(), token);
        token
    }

    /// Seeds a method definition with a body.
    pub fn add_method(&mut self, owner: Token, name: &str, signature: &[u8], body: &[u8]) -> Token {
        let token = self.next_token(table::METHOD_DEF);
        self.methods.insert(
            token,
            MethodRecord {
                props: MethodProps {
                    owner,
                    name: name.to_string(),
                    attributes: 0x0086, // public | hidebysig
                    signature: signature.to_vec(),
                    rva: 0x2050,
                    impl_flags: 0,
                },
                body: Some(body.to_vec()),
                params: Vec::new(),
                generic_params: Vec::new(),
            },
        );
        self.members_by_type
            .entry(owner)
            .or_default()
            .push((name.to_string(), token));
        token
    }

    /// Adds parameter rows to a seeded method.
    pub fn add_params(&mut self, method: Token, names: &[&str]) {
        let record = self.methods.get_mut(&method).expect("unknown method");
        for (index, name) in names.iter().enumerate() {
            record.params.push(ParamProps {
                sequence: index as u32 + 1,
                name: (*name).to_string(),
                attributes: 0,
            });
        }
    }

    /// Adds generic parameter rows to a seeded method.
    pub fn add_generic_params(&mut self, method: Token, names: &[&str]) {
        let record = self.methods.get_mut(&method).expect("unknown method");
        for (index, name) in names.iter().enumerate() {
            record.generic_params.push(GenericParamProps {
                sequence: index as u32,
                name: (*name).to_string(),
                attributes: 0,
                constraints: Vec::new(),
            });
        }
    }

    /// The name a user-string token was interned for, if any.
    pub fn user_string(&self, token: Token) -> Option<&str> {
        self.user_strings
            .iter()
            .find(|(_, t)| **t == token)
            .map(|(s, _)| s.as_str())
    }

    /// The interned local-signature blob behind a token.
    pub fn local_sig(&self, token: Token) -> Option<&[u8]> {
        self.local_sig_blobs.get(&token).map(Vec::as_slice)
    }
}

impl MetadataStore for FakeStore {
    fn method_props(&self, method: Token) -> Result<MethodProps> {
        self.methods
            .get(&method)
            .map(|record| record.props.clone())
            .ok_or_else(|| Error::Store(format!("unknown method {method}")))
    }

    fn type_name(&self, type_token: Token) -> Result<String> {
        self.type_def_names
            .get(&type_token)
            .or_else(|| self.type_ref_names.get(&type_token))
            .cloned()
            .ok_or(Error::TypeNotFound(type_token))
    }

    fn find_type_def(&self, name: &str) -> Result<Option<Token>> {
        Ok(self.type_defs_by_name.get(name).copied())
    }

    fn find_members(&self, type_def: Token, name: &str) -> Result<Vec<Token>> {
        Ok(self
            .members_by_type
            .get(&type_def)
            .map(|members| {
                members
                    .iter()
                    .filter(|(member_name, _)| member_name == name)
                    .map(|(_, token)| *token)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn standalone_signature(&self, sig_token: Token) -> Result<Vec<u8>> {
        self.local_sig_blobs
            .get(&sig_token)
            .cloned()
            .ok_or_else(|| Error::Store(format!("unknown standalone sig {sig_token}")))
    }

    fn method_body(&self, method: Token) -> Result<Vec<u8>> {
        self.methods
            .get(&method)
            .and_then(|record| record.body.clone())
            .ok_or_else(|| Error::Store(format!("no body for {method}")))
    }

    fn params(&self, method: Token) -> Result<Vec<ParamProps>> {
        Ok(self
            .methods
            .get(&method)
            .map(|record| record.params.clone())
            .unwrap_or_default())
    }

    fn generic_params(&self, method: Token) -> Result<Vec<GenericParamProps>> {
        Ok(self
            .methods
            .get(&method)
            .map(|record| record.generic_params.clone())
            .unwrap_or_default())
    }

    fn assembly_ref(&mut self, name: &str) -> Result<Token> {
        self.mutations += 1;
        if let Some(token) = self.assembly_refs.get(name) {
            return Ok(*token);
        }
        let token = self.next_token(table::ASSEMBLY_REF);
        self.assembly_refs.insert(name.to_string(), token);
        Ok(token)
    }

    fn define_type_ref(&mut self, scope: Token, name: &str) -> Result<Token> {
        self.mutations += 1;
        let key = (scope, name.to_string());
        if let Some(token) = self.type_refs.get(&key) {
            return Ok(*token);
        }
        let token = self.next_token(table::TYPE_REF);
        self.type_refs.insert(key, token);
        self.type_ref_names.insert(token, name.to_string());
        Ok(token)
    }

    fn define_member_ref(&mut self, parent: Token, name: &str, signature: &[u8]) -> Result<Token> {
        self.mutations += 1;
        let key = (parent, name.to_string(), signature.to_vec());
        if let Some(token) = self.member_refs.get(&key) {
            return Ok(*token);
        }
        let token = self.next_token(table::MEMBER_REF);
        self.member_refs.insert(key, token);
        Ok(token)
    }

    fn define_method(
        &mut self,
        owner: Token,
        name: &str,
        attributes: u32,
        signature: &[u8],
        rva: u32,
        impl_flags: u32,
    ) -> Result<Token> {
        self.mutations += 1;
        let token = self.next_token(table::METHOD_DEF);
        self.methods.insert(
            token,
            MethodRecord {
                props: MethodProps {
                    owner,
                    name: name.to_string(),
                    attributes,
                    signature: signature.to_vec(),
                    rva,
                    impl_flags,
                },
                body: None,
                params: Vec::new(),
                generic_params: Vec::new(),
            },
        );
        self.members_by_type
            .entry(owner)
            .or_default()
            .push((name.to_string(), token));
        Ok(token)
    }

    fn define_method_spec(&mut self, method: Token, instantiation: &[u8]) -> Result<Token> {
        self.mutations += 1;
        let key = (method, instantiation.to_vec());
        if let Some(token) = self.method_specs.get(&key) {
            return Ok(*token);
        }
        let token = self.next_token(table::METHOD_SPEC);
        self.method_specs.insert(key, token);
        Ok(token)
    }

    fn define_param(&mut self, method: Token, props: &ParamProps) -> Result<Token> {
        self.mutations += 1;
        let record = self
            .methods
            .get_mut(&method)
            .ok_or_else(|| Error::Store(format!("unknown method {method}")))?;
        record.params.push(props.clone());
        Ok(Token::from_parts(0x08, record.params.len() as u32))
    }

    fn define_generic_param(&mut self, method: Token, props: &GenericParamProps) -> Result<Token> {
        self.mutations += 1;
        let record = self
            .methods
            .get_mut(&method)
            .ok_or_else(|| Error::Store(format!("unknown method {method}")))?;
        record.generic_params.push(props.clone());
        Ok(Token::from_parts(0x2A, record.generic_params.len() as u32))
    }

    fn define_user_string(&mut self, value: &str) -> Result<Token> {
        self.mutations += 1;
        if let Some(token) = self.user_strings.get(value) {
            return Ok(*token);
        }
        let token = self.next_token(table::USER_STRING);
        self.user_strings.insert(value.to_string(), token);
        Ok(token)
    }

    fn token_from_local_sig(&mut self, signature: &[u8]) -> Result<Token> {
        self.mutations += 1;
        if let Some(token) = self.local_sigs.get(signature) {
            return Ok(*token);
        }
        let token = self.next_token(table::STANDALONE_SIG);
        self.local_sigs.insert(signature.to_vec(), token);
        self.local_sig_blobs.insert(token, signature.to_vec());
        Ok(token)
    }

    fn token_from_type_spec(&mut self, signature: &[u8]) -> Result<Token> {
        self.mutations += 1;
        if let Some(token) = self.type_specs.get(signature) {
            return Ok(*token);
        }
        let token = self.next_token(table::TYPE_SPEC);
        self.type_specs.insert(signature.to_vec(), token);
        Ok(token)
    }

    fn set_method_body(&mut self, method: Token, body: &[u8]) -> Result<()> {
        self.mutations += 1;
        let record = self
            .methods
            .get_mut(&method)
            .ok_or_else(|| Error::Store(format!("unknown method {method}")))?;
        record.body = Some(body.to_vec());
        Ok(())
    }
}

/// Installs the fmt subscriber writing to the test capture buffer. Safe to
/// call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Wraps raw code bytes in a tiny body header.
pub fn tiny_body(code: &[u8]) -> Vec<u8> {
    assert!(code.len() < 64, "tiny bodies hold under 64 code bytes");
    let mut body = vec![0x02 | ((code.len() as u8) << 2)];
    body.extend_from_slice(code);
    body
}
