//! Minimal message abstraction: a header map plus content bytes.

use crate::multipart::HeaderFields;
use std::io::Read;

/// What the engine needs from an inbound message.
pub trait MessageSource {
    fn header(&self, name: &str) -> Option<&str>;
    fn content_reader(&self) -> Box<dyn Read + '_>;
}

/// An in-memory message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    headers: HeaderFields,
    content: Vec<u8>,
}

impl Message {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: HeaderFields::new(),
            content: content.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
    }
}

impl MessageSource for Message {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    fn content_reader(&self) -> Box<dyn Read + '_> {
        Box::new(self.content.as_slice())
    }
}
