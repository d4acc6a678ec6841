//! Host adapter for the XOP engine.
//!
//! Resolves configuration against the host's variables, runs the engine on
//! the named message, and publishes results back as variables.

use crate::config::XopAgentConfig;
use crate::engine::{ActionOutput, XopEngine};
use crate::error::{Result, XopError};
use crate::interpolate::VariableLookup;
use crate::message::Message;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// The host's view of one message flow.
pub trait MessageContext {
    fn variable(&self, name: &str) -> Option<String>;
    fn set_variable(&mut self, name: &str, value: String);
    fn message(&self, name: &str) -> Option<&Message>;
    fn message_mut(&mut self, name: &str) -> Option<&mut Message>;
}

/// In-memory [`MessageContext`], used by the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct SimpleMessageContext {
    variables: BTreeMap<String, String>,
    messages: HashMap<String, Message>,
}

impl SimpleMessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_message(mut self, name: impl Into<String>, message: Message) -> Self {
        self.messages.insert(name.into(), message);
        self
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }
}

impl MessageContext for SimpleMessageContext {
    fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: String) {
        self.variables.insert(name.to_string(), value);
    }

    fn message(&self, name: &str) -> Option<&Message> {
        self.messages.get(name)
    }

    fn message_mut(&mut self, name: &str) -> Option<&mut Message> {
        self.messages.get_mut(name)
    }
}

/// Exposes a context's variables for interpolation.
struct ContextVariables<'a, C: ?Sized>(&'a C);

impl<C: MessageContext + ?Sized> VariableLookup for ContextVariables<'_, C> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.0.variable(name)
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    Success,
    Abort,
}

/// XOP agent: one configuration, any number of invocations.
pub struct XopAgent {
    config: XopAgentConfig,
    /// Metrics tracking
    invocations: AtomicU64,
    aborts: AtomicU64,
}

impl XopAgent {
    pub fn new(config: XopAgentConfig) -> Self {
        Self {
            config,
            invocations: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &XopAgentConfig {
        &self.config
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn aborts(&self) -> u64 {
        self.aborts.load(Ordering::Relaxed)
    }

    fn var_name(&self, suffix: &str) -> String {
        format!("{}{}", self.config.variable_prefix, suffix)
    }

    /// Run one invocation against `ctx`. The source message is only
    /// modified on success.
    pub fn execute<C: MessageContext + ?Sized>(&self, ctx: &mut C) -> ExecutionResult {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        match self.try_execute(ctx) {
            Ok(()) => ExecutionResult::Success,
            Err(err) => {
                self.aborts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %err,
                    structural = err.is_structural(),
                    "XOP action aborted"
                );
                ctx.set_variable(&self.var_name("error"), err.to_string());
                ctx.set_variable(&self.var_name("exception"), err.exception());
                if self.config.debug && !err.is_structural() {
                    ctx.set_variable(&self.var_name("stacktrace"), err.diagnostic_trace());
                }
                ExecutionResult::Abort
            }
        }
    }

    fn try_execute<C: MessageContext + ?Sized>(&self, ctx: &mut C) -> Result<()> {
        let resolved = self.config.resolve(&ContextVariables(&*ctx))?;
        let action = resolved.engine.action;
        ctx.set_variable(&self.var_name("action"), action.as_str().to_ascii_lowercase());

        let engine = XopEngine::new(resolved.engine);
        let output = {
            let message = ctx
                .message(&resolved.source)
                .ok_or_else(|| XopError::structure("source message is null."))?;
            engine.run(message)?
        };

        match &output {
            ActionOutput::Edited {
                transformed_xml, ..
            } => ctx.set_variable(&self.var_name("transformed"), transformed_xml.clone()),
            ActionOutput::Extracted { xml } => {
                ctx.set_variable(&self.var_name("extracted_xml"), xml.clone())
            }
            ActionOutput::Embedded { .. } => {}
        }

        if let Some(message) = ctx.message_mut(&resolved.source) {
            output.apply_to(message);
            debug!(source = %resolved.source, "Message updated");
        }

        info!(action = %action, source = %resolved.source, "XOP action completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPE: &str = "multipart/related; type='application/xop+xml'; boundary='b'";

    fn body(xml_type: &str) -> String {
        format!(
            "--b\r\nContent-Type: {}\r\n\r\n\
<S:Envelope xmlns:S='http://schemas.xmlsoap.org/soap/envelope/'><S:Body>\
<x xmlns:xop='http://www.w3.org/2004/08/xop/include'><xop:Include href='cid:a'/></x>\
</S:Body></S:Envelope>\r\n\
--b\r\nContent-Type: application/pdf\r\nContent-ID: <a>\r\n\r\n%PDF\r\n--b--\r\n",
            xml_type
        )
    }

    fn context(xml_type: &str) -> SimpleMessageContext {
        SimpleMessageContext::new().with_message(
            "message",
            Message::new(body(xml_type)).with_header("content-type", CONTENT_TYPE),
        )
    }

    fn agent(action: &str) -> XopAgent {
        XopAgent::new(XopAgentConfig {
            action: Some(action.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_agent_creation() {
        let agent = XopAgent::new(XopAgentConfig::default());
        assert_eq!(agent.invocations(), 0);
        assert_eq!(agent.aborts(), 0);
        assert_eq!(agent.config().variable_prefix, "xop_");
    }

    #[test]
    fn test_extract_publishes_variable() {
        let agent = agent("extract_soap");
        let mut ctx = context("text/xml");
        assert_eq!(agent.execute(&mut ctx), ExecutionResult::Success);
        assert_eq!(ctx.variable("xop_action").as_deref(), Some("extract_soap"));
        assert!(ctx.variable("xop_extracted_xml").unwrap().starts_with("<S:Envelope"));
        assert_eq!(ctx.message("message").unwrap().content(), body("text/xml").as_bytes());
    }

    #[test]
    fn test_transform_updates_message() {
        let agent = agent("transform_to_embedded");
        let mut ctx = context("text/xml");
        assert_eq!(agent.execute(&mut ctx), ExecutionResult::Success);
        let msg = ctx.message("message").unwrap();
        assert_eq!(msg.header("content-type"), Some("text/xml"));
        assert!(String::from_utf8_lossy(msg.content()).contains("<x>JVBERg==</x>"));
    }

    #[test]
    fn test_abort_leaves_message_untouched() {
        let agent = agent("transform_to_embedded");
        let mut ctx = context("image/bmp");
        let before = ctx.message("message").unwrap().clone();
        assert_eq!(agent.execute(&mut ctx), ExecutionResult::Abort);
        assert_eq!(ctx.message("message").unwrap(), &before);
        assert_eq!(
            ctx.variable("xop_error").as_deref(),
            Some("unexpected content-type for part #1 (image/bmp)")
        );
        assert_eq!(
            ctx.variable("xop_exception").as_deref(),
            Some("Structure: unexpected content-type for part #1 (image/bmp)")
        );
        assert!(ctx.variable("xop_stacktrace").is_none());
        assert_eq!(agent.aborts(), 1);
    }

    #[test]
    fn test_bogus_action() {
        let agent = agent("bogus");
        let mut ctx = context("text/xml");
        assert_eq!(agent.execute(&mut ctx), ExecutionResult::Abort);
        assert_eq!(ctx.variable("xop_error").as_deref(), Some("specify a valid action."));
        assert!(ctx.variable("xop_action").is_none());
    }

    #[test]
    fn test_missing_source_message() {
        let agent = XopAgent::new(XopAgentConfig {
            source: Some("{flow.source}".to_string()),
            ..Default::default()
        });
        let mut ctx = context("text/xml").with_variable("flow.source", "response");
        assert_eq!(agent.execute(&mut ctx), ExecutionResult::Abort);
        assert_eq!(ctx.variable("xop_error").as_deref(), Some("source message is null."));
    }

    #[test]
    fn test_stacktrace_only_for_unexpected_errors_in_debug() {
        let agent = XopAgent::new(XopAgentConfig {
            action: Some("transform_to_embedded".to_string()),
            debug: true,
            variable_prefix: "mtom.".to_string(),
            ..Default::default()
        });
        let bad_xml = "--b\r\nContent-Type: text/xml\r\n\r\n<a><b></a>\r\n--b--\r\n";
        let mut ctx = SimpleMessageContext::new().with_message(
            "message",
            Message::new(bad_xml).with_header("content-type", CONTENT_TYPE),
        );
        assert_eq!(agent.execute(&mut ctx), ExecutionResult::Abort);
        assert!(ctx.variable("mtom.error").is_some());
        assert!(ctx
            .variable("mtom.exception")
            .unwrap()
            .starts_with("XmlParse: XML parsing error:"));
        assert!(ctx.variable("mtom.stacktrace").unwrap().contains("XmlParse"));

        let mut ctx = context("image/bmp");
        agent.execute(&mut ctx);
        assert!(ctx.variable("mtom.stacktrace").is_none());
    }
}
