//! Share attribution for forwarded `mining.submit` requests.
//!
//! Every browser client mines under the bridge's single pool authorization,
//! so the worker name a client puts in its submit is meaningless upstream.
//! A [`SubmitRewrite`] maps the client's submit params to the params that
//! actually go to the pool.

use std::fmt;

use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};

/// Rewrite policy for `mining.submit` params.
///
/// Must be pure: the result depends only on `params` and the policy's own
/// configuration.
pub trait SubmitRewrite: fmt::Debug + Send + Sync {
    fn rewrite(&self, params: Value) -> BridgeResult<Value>;
}

/// Overwrite the worker name (param 0) with a fixed identity.
#[derive(Debug, Clone)]
pub struct FixedWorker {
    worker: String,
}

impl FixedWorker {
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
        }
    }
}

impl SubmitRewrite for FixedWorker {
    fn rewrite(&self, params: Value) -> BridgeResult<Value> {
        let Value::Array(mut params) = params else {
            return Err(BridgeError::InvalidMessage(
                "mining.submit params not an array".to_string(),
            ));
        };

        let worker = Value::String(self.worker.clone());
        match params.first_mut() {
            Some(first) => *first = worker,
            None => params.push(worker),
        }

        Ok(Value::Array(params))
    }
}
