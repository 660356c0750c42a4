//! Stratum wire handling for the bridge.
//!
//! Stratum v1 is newline-delimited JSON-RPC. The bridge is not a full
//! Stratum client: it builds the pool handshake itself and otherwise only
//! looks at the `method` of client messages, to drop `mining.authorize` and
//! re-attribute `mining.submit`.

pub mod codec;
pub mod messages;
pub mod rewrite;

pub use codec::{encode_line, split_lines};
pub use messages::{AUTHORIZE, ClientMessage, MessageId, Request, SUBMIT, SUBSCRIBE};
pub use rewrite::{FixedWorker, SubmitRewrite};
