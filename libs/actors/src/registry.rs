//! Code Registry
//!
//! Maps a [`CodeId`] to the factory that builds an actor from its encoded
//! initial data. Every instance deployed from one code id shares the factory,
//! the same way contract instances share one code body.

use crate::error::TransportError;
use crate::messages::ActorMessage;
use crate::system::ActorBehavior;
use dashmap::DashMap;
use std::sync::Arc;
use types::CodeId;

/// Builds an actor from the `data` of its `StateInit`
pub type CodeFactory<M> =
    Arc<dyn Fn(&[u8]) -> Result<Box<dyn ActorBehavior<M>>, TransportError> + Send + Sync>;

pub struct CodeRegistry<M> {
    codes: DashMap<CodeId, CodeFactory<M>>,
}

impl<M: ActorMessage> CodeRegistry<M> {
    pub fn new() -> Self {
        Self {
            codes: DashMap::new(),
        }
    }

    /// Register `factory` under `code`, replacing any earlier registration
    pub fn register(&self, code: CodeId, factory: CodeFactory<M>) {
        tracing::debug!(code = ?code, "Registering code");
        self.codes.insert(code, factory);
    }

    pub fn contains(&self, code: &CodeId) -> bool {
        self.codes.contains_key(code)
    }

    /// Instantiate an actor from `code` and its initial data
    pub fn instantiate(
        &self,
        code: &CodeId,
        data: &[u8],
    ) -> Result<Box<dyn ActorBehavior<M>>, TransportError> {
        let factory = self
            .codes
            .get(code)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TransportError::UnknownCode { code: *code })?;
        factory(data)
    }
}

impl<M: ActorMessage> Default for CodeRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
