//! Signing rules defined by a Lua module.

use super::{RuleEngine, RuleRequest};
use crate::{core::Verdict, serialization};
use anyhow::{bail, Context as _, Result};
use mlua::{Function, Lua, LuaOptions, LuaSerdeExt as _, StdLib, Value, Variadic};
use serde::Serialize;
use std::{
    fs,
    path::Path,
    sync::{Mutex, PoisonError},
};

/// The name of the global function the module must define.
const SIGN_HANDLER: &str = "sign";

/// A rule engine whose logic is defined by a Lua module.
///
/// The module defines a global `sign(account, request)` function, called
/// with the wallet-qualified account name and a table with `client`,
/// `public_key`, `data` and `domain` fields (byte strings hex encoded with a
/// `0x` prefix). It must return a boolean.
pub struct LuaRules {
    lua: Mutex<Lua>,
}

/// The request table passed to the Lua handler.
#[derive(Serialize)]
struct SignTable<'a> {
    client: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    #[serde(with = "serialization::bytes")]
    public_key: &'a [u8],
    #[serde(with = "serialization::bytes")]
    data: &'a [u8],
    #[serde(with = "serialization::bytes")]
    domain: &'a [u8],
}

impl LuaRules {
    /// Creates rules from the Lua module at the specified path.
    pub fn new(module: &Path) -> Result<Self> {
        let src = fs::read_to_string(module)
            .with_context(|| format!("failed to read rules module {}", module.display()))?;
        Self::from_source(&src)
    }

    /// Creates rules from Lua source code.
    pub fn from_source(src: &str) -> Result<Self> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::UTF8 | StdLib::MATH,
            LuaOptions::default(),
        )?;

        // Override `print` function and forward it to logs.
        let print = lua.create_function(|lua, values: Variadic<Value>| {
            let mut buffer = String::new();
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    buffer.push('\t');
                }
                if let Some(string) = lua.coerce_string(value.clone())? {
                    buffer.push_str(&string.to_string_lossy());
                }
            }
            tracing::debug!("{buffer}");
            Ok(())
        })?;
        lua.globals().set("print", print)?;

        lua.load(src).set_name("rules").exec()?;

        Ok(Self {
            lua: Mutex::new(lua),
        })
    }

    fn sign(&self, request: &RuleRequest) -> Result<bool> {
        let lua = self.lua.lock().unwrap_or_else(PoisonError::into_inner);
        let handler = lua
            .globals()
            .get::<_, Function>(SIGN_HANDLER)
            .with_context(|| format!("missing '{SIGN_HANDLER}' handler in module"))?;

        let table = SignTable {
            client: &request.credentials.client,
            request_id: request.credentials.request_id.as_deref(),
            public_key: request.account.public_key().as_bytes(),
            data: request.data,
            domain: request.domain,
        };
        let input = (request.account.path(), lua.to_value(&table)?);
        let approved = match handler.call::<_, Value>(input)? {
            Value::Boolean(approved) => approved,
            other => bail!(
                "handler '{SIGN_HANDLER}' returned {} instead of a boolean",
                other.type_name()
            ),
        };
        Ok(approved)
    }
}

impl RuleEngine for LuaRules {
    fn evaluate(&self, request: &RuleRequest) -> Verdict {
        match self.sign(request) {
            Ok(true) => Verdict::Approved,
            Ok(false) => Verdict::Denied,
            Err(_) => Verdict::Failed,
        }
    }
}
