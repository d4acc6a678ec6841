//! XOP/MTOM message transformation library
//!
//! The library runs against any host that implements [`MessageContext`];
//! the bundled binary drives it from files. No proxy protocol is included.
//!
//! Converts SOAP messages between the MTOM `multipart/related` form, where a
//! binary attachment travels as a separate MIME part, and a single XML
//! document with the attachment inlined as base64.
//!
//! # Actions
//!
//! - `EDIT_1`: strip the WS-Security UsernameToken from the XML part and
//!   re-emit the two-part envelope with the attachment untouched
//! - `EXTRACT_SOAP`: publish the XML part as text
//! - `TRANSFORM_TO_EMBEDDED`: replace each `xop:Include` with the base64 of
//!   the part it references and emit plain XML
//!
//! # Example
//!
//! ```ignore
//! use zentinel_agent_xop::{Message, SimpleMessageContext, XopAgent, XopAgentConfig};
//!
//! let agent = XopAgent::new(XopAgentConfig {
//!     action: Some("transform_to_embedded".to_string()),
//!     ..Default::default()
//! });
//! let mut ctx = SimpleMessageContext::new()
//!     .with_message("message", Message::new(body).with_header("content-type", content_type));
//! agent.execute(&mut ctx);
//! ```

pub mod agent;
pub mod config;
pub mod document;
pub mod embed;
pub mod engine;
pub mod error;
pub mod interpolate;
pub mod message;
pub mod multipart;
pub mod parser;
pub mod validator;
pub mod wsse;
pub mod xpath;

pub use agent::{ExecutionResult, MessageContext, SimpleMessageContext, XopAgent};
pub use config::{EngineConfig, XopAction, XopAgentConfig};
pub use engine::{ActionOutput, XopEngine};
pub use error::{Result, XopError};
pub use message::{Message, MessageSource};
pub use multipart::{HeaderFields, MultipartReader, MultipartWriter};
pub use validator::ContentTypeAllowlist;
pub use wsse::UsernameTokenPolicy;
