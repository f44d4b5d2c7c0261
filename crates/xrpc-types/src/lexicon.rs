//! The lexicon registry and validator seam (§3 "LexiconRegistry", and the
//! out-of-scope `assertValidXrpc{Params,Input,Output}` collaborator named in
//! §1).

use std::collections::HashMap;

use serde_json::Value;

use crate::body::DeclaredEncoding;
use crate::error::XrpcErrorKind;
use crate::nsid::Nsid;
use crate::params::{ParamType, Params};

/// The three method kinds a lexicon document may declare for an NSID (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Query,
    Procedure,
    Subscription,
}

/// One method's schema-derived shape: parameter list, input/output
/// encodings, and the declared error names a handler may raise by custom
/// name.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub nsid: Nsid,
    pub kind: MethodKind,
    pub params: Vec<(String, ParamType)>,
    /// `None` means the method declares no input body at all.
    pub input_encoding: Option<DeclaredEncoding>,
    pub output_encoding: Option<DeclaredEncoding>,
    pub errors: Vec<String>,
}

impl MethodDef {
    pub fn query(nsid: Nsid) -> Self {
        Self {
            nsid,
            kind: MethodKind::Query,
            params: Vec::new(),
            input_encoding: None,
            output_encoding: None,
            errors: Vec::new(),
        }
    }

    pub fn procedure(nsid: Nsid) -> Self {
        Self {
            nsid,
            kind: MethodKind::Procedure,
            params: Vec::new(),
            input_encoding: None,
            output_encoding: None,
            errors: Vec::new(),
        }
    }

    pub fn subscription(nsid: Nsid) -> Self {
        Self {
            nsid,
            kind: MethodKind::Subscription,
            params: Vec::new(),
            input_encoding: None,
            output_encoding: None,
            errors: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, ParamType)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_input(mut self, encoding: DeclaredEncoding) -> Self {
        self.input_encoding = Some(encoding);
        self
    }

    pub fn with_output(mut self, encoding: DeclaredEncoding) -> Self {
        self.output_encoding = Some(encoding);
        self
    }
}

/// An immutable, read-only-after-construction NSID → method mapping (§3,
/// §5 concurrency model point (b)). Lookup is O(1) via a `HashMap`.
#[derive(Debug, Default, Clone)]
pub struct LexiconRegistry {
    methods: HashMap<String, MethodDef>,
}

impl LexiconRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: MethodDef) {
        self.methods.insert(def.nsid.as_str().to_string(), def);
    }

    pub fn get(&self, nsid: &Nsid) -> Option<&MethodDef> {
        self.methods.get(nsid.as_str())
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// The external lexicon-validator collaborator (§1 out-of-scope,
/// §4.2 "Schema validation"). Implementations typically wrap a JSON-schema
/// library keyed by NSID; the default here is permissive, so a registry
/// built without a real validator still dispatches, just without schema
/// enforcement.
pub trait LexiconValidator: Send + Sync {
    fn assert_valid_params(&self, nsid: &Nsid, params: &Params) -> Result<(), XrpcErrorKind>;
    fn assert_valid_input(&self, nsid: &Nsid, input: &Value) -> Result<(), XrpcErrorKind>;
    fn assert_valid_output(&self, nsid: &Nsid, output: &Value) -> Result<(), XrpcErrorKind>;
}

/// A validator that accepts everything. Useful for tests and for embedding
/// applications that perform schema validation elsewhere in the pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveValidator;

impl LexiconValidator for PermissiveValidator {
    fn assert_valid_params(&self, _nsid: &Nsid, _params: &Params) -> Result<(), XrpcErrorKind> {
        Ok(())
    }

    fn assert_valid_input(&self, _nsid: &Nsid, _input: &Value) -> Result<(), XrpcErrorKind> {
        Ok(())
    }

    fn assert_valid_output(&self, _nsid: &Nsid, _output: &Value) -> Result<(), XrpcErrorKind> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_is_keyed_by_nsid() {
        let mut reg = LexiconRegistry::new();
        let nsid = Nsid::raw("com.example.foo");
        reg.register(MethodDef::query(nsid.clone()));
        assert!(reg.get(&nsid).is_some());
        assert!(reg.get(&Nsid::raw("com.example.bar")).is_none());
    }

    #[test]
    fn permissive_validator_accepts_anything() {
        let v = PermissiveValidator;
        let nsid = Nsid::raw("com.example.foo");
        assert!(v.assert_valid_params(&nsid, &Params::new()).is_ok());
        assert!(v.assert_valid_input(&nsid, &Value::Null).is_ok());
        assert!(v.assert_valid_output(&nsid, &Value::Null).is_ok());
    }
}
