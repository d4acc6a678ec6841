//! The XOP action engine.
//!
//! [`XopEngine::run`] reads a multipart/related message and performs one
//! action on it. It never touches the message itself: the result comes
//! back as an [`ActionOutput`], which the caller applies on success.

use crate::config::{EngineConfig, XopAction};
use crate::embed::embed_attachments;
use crate::error::{from_io, Result, XopError};
use crate::message::{Message, MessageSource};
use crate::multipart::{boundary_from_content_type, MultipartReader, MultipartWriter, Part};
use crate::parser::parse_document;
use crate::wsse::strip_username_token;
use std::io::{self, BufRead, BufReader};
use tracing::{debug, info};

/// What a successful action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutput {
    /// EDIT_1: the rewritten XML part and the new multipart body
    Edited {
        transformed_xml: String,
        content: Vec<u8>,
    },
    /// EXTRACT_SOAP: the raw text of the XML part
    Extracted { xml: String },
    /// TRANSFORM_TO_EMBEDDED: the XML with attachments inlined
    Embedded { xml: String },
}

impl ActionOutput {
    /// Apply the output to `message`. Extraction leaves the message as is.
    pub fn apply_to(&self, message: &mut Message) {
        match self {
            Self::Edited { content, .. } => message.set_content(content.clone()),
            Self::Extracted { .. } => {}
            Self::Embedded { xml } => {
                message.set_content(xml.as_bytes().to_vec());
                message.set_header("content-type", "text/xml");
            }
        }
    }
}

/// Stateless executor for one resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct XopEngine {
    config: EngineConfig,
}

impl XopEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the configured action against `message`.
    pub fn run<M: MessageSource + ?Sized>(&self, message: &M) -> Result<ActionOutput> {
        let content_type = message.header("content-type");
        let boundary = boundary_from_content_type(content_type)?;
        let mut reader = MultipartReader::new(BufReader::new(message.content_reader()), &boundary);

        info!(action = %self.config.action, boundary = %boundary, "Running XOP action");

        match self.config.action {
            XopAction::Edit1 => {
                // boundary_from_content_type succeeded, so the header exists
                let outer = content_type.unwrap_or_default();
                self.edit(&mut reader, outer, &boundary)
            }
            XopAction::ExtractSoap => self.extract(&mut reader),
            XopAction::TransformToEmbedded => self.transform(&mut reader),
        }
    }

    fn edit<R: BufRead>(
        &self,
        reader: &mut MultipartReader<R>,
        content_type: &str,
        boundary: &str,
    ) -> Result<ActionOutput> {
        let mut writer = MultipartWriter::new(Vec::new(), content_type, boundary);

        let transformed_xml = {
            let mut part = self.xml_part(reader)?;
            let xml = part.read_to_vec()?;
            let transformed = strip_username_token(&xml, self.config.username_tokens)?;
            writer.start_part(part.headers())?;
            io::Write::write_all(&mut writer, transformed.as_bytes()).map_err(from_io)?;
            transformed
        };

        {
            let mut part = expect_part(reader, 2)?;
            self.config
                .attachment_content_types
                .validate_part(part.headers(), 2)?;
            writer.start_part(part.headers())?;
            let copied = io::copy(&mut part, &mut writer).map_err(from_io)?;
            debug!(part = 2, size = copied, "Copied attachment");
        }

        if let Some(extra) = reader.next_part()? {
            return Err(XopError::structure(format!(
                "unexpected part #{} (expected exactly 2 parts)",
                extra.index()
            )));
        }

        writer.close()?;
        debug!(parts = writer.parts_written(), "Envelope rewritten");
        Ok(ActionOutput::Edited {
            transformed_xml,
            content: writer.into_inner(),
        })
    }

    fn extract<R: BufRead>(&self, reader: &mut MultipartReader<R>) -> Result<ActionOutput> {
        let mut part = self.xml_part(reader)?;
        let bytes = part.read_to_vec()?;
        Ok(ActionOutput::Extracted {
            xml: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    fn transform<R: BufRead>(&self, reader: &mut MultipartReader<R>) -> Result<ActionOutput> {
        let doc = {
            let mut part = self.xml_part(reader)?;
            parse_document(&part.read_to_vec()?)?
        };
        let xml = embed_attachments(doc, reader, &self.config.attachment_content_types)?;
        Ok(ActionOutput::Embedded { xml })
    }

    /// Part #1, validated against the XML allowlist.
    fn xml_part<'r, R: BufRead>(
        &self,
        reader: &'r mut MultipartReader<R>,
    ) -> Result<Part<'r, R>> {
        let part = expect_part(reader, 1)?;
        self.config.xml_content_types.validate_part(part.headers(), 1)?;
        Ok(part)
    }
}

fn expect_part<R: BufRead>(reader: &mut MultipartReader<R>, index: usize) -> Result<Part<'_, R>> {
    reader
        .next_part()?
        .ok_or_else(|| XopError::structure(format!("missing part #{}", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ContentTypeAllowlist;
    use crate::wsse::UsernameTokenPolicy;

    const CONTENT_TYPE: &str =
        "multipart/related; type=\"application/xop+xml\"; boundary=\"XX\"; start-info=\"text/xml\"";

    const ENVELOPE: &str = "<S:Envelope xmlns:S='http://schemas.xmlsoap.org/soap/envelope/'>\n\
  <S:Header>\n\
    <wsse:Security xmlns:wsse='http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd'>\n\
      <wsse:UsernameToken><wsse:Username>u</wsse:Username></wsse:UsernameToken>\n\
    </wsse:Security>\n\
  </S:Header>\n\
  <S:Body>\n\
    <doc xmlns:xop='http://www.w3.org/2004/08/xop/include'><data><xop:Include href='cid:att'/></data></doc>\n\
  </S:Body>\n\
</S:Envelope>";

    fn message(parts: &[(&str, &str)]) -> Message {
        let mut body = String::from("preamble\r\n");
        for (headers, content) in parts {
            body.push_str("--XX\r\n");
            body.push_str(headers);
            body.push_str("\r\n\r\n");
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str("--XX--\r\n");
        Message::new(body).with_header("Content-Type", CONTENT_TYPE)
    }

    fn standard() -> Message {
        message(&[
            ("Content-Type: application/xop+xml; type=\"text/xml\"", ENVELOPE),
            ("Content-Type: application/octet-stream\r\nContent-ID: <att>", "BINARY"),
        ])
    }

    fn engine(action: XopAction) -> XopEngine {
        XopEngine::new(EngineConfig {
            action,
            ..Default::default()
        })
    }

    #[test]
    fn test_edit_strips_token_and_keeps_attachment() {
        let output = engine(XopAction::Edit1).run(&standard()).unwrap();
        let ActionOutput::Edited {
            transformed_xml,
            content,
        } = output
        else {
            panic!("expected edited output");
        };
        assert!(!transformed_xml.contains("UsernameToken"));

        let mut reader = MultipartReader::new(content.as_slice(), "XX");
        let mut first = reader.next_part().unwrap().unwrap();
        assert_eq!(
            first.content_type(),
            Some("application/xop+xml; type=\"text/xml\"")
        );
        assert_eq!(first.read_to_vec().unwrap(), transformed_xml.as_bytes());
        let mut second = reader.next_part().unwrap().unwrap();
        assert_eq!(second.content_id(), Some("<att>"));
        assert_eq!(second.read_to_vec().unwrap(), b"BINARY");
        assert!(reader.next_part().unwrap().is_none());
    }

    #[test]
    fn test_edit_requires_two_parts() {
        let one = message(&[("Content-Type: text/xml", ENVELOPE)]);
        let err = engine(XopAction::Edit1).run(&one).unwrap_err();
        assert_eq!(err.to_string(), "missing part #2");

        let three = message(&[
            ("Content-Type: text/xml", ENVELOPE),
            ("Content-Type: image/png", "a"),
            ("Content-Type: image/png", "b"),
        ]);
        let err = engine(XopAction::Edit1).run(&three).unwrap_err();
        assert!(err.to_string().starts_with("unexpected part #3"));
    }

    #[test]
    fn test_extract_returns_raw_text() {
        let output = engine(XopAction::ExtractSoap).run(&standard()).unwrap();
        assert_eq!(
            output,
            ActionOutput::Extracted {
                xml: ENVELOPE.to_string()
            }
        );

        let mut msg = standard();
        let before = msg.clone();
        output.apply_to(&mut msg);
        assert_eq!(msg, before);
    }

    #[test]
    fn test_transform_embeds() {
        let output = engine(XopAction::TransformToEmbedded).run(&standard()).unwrap();
        let mut msg = standard();
        output.apply_to(&mut msg);
        assert_eq!(msg.header("content-type"), Some("text/xml"));
        let xml = String::from_utf8(msg.content().to_vec()).unwrap();
        assert!(xml.contains("<data>QklOQVJZ</data>"));
        assert!(xml.contains("UsernameToken"));
    }

    #[test]
    fn test_missing_boundary() {
        let msg = Message::new("x").with_header("Content-Type", "multipart/related");
        let err = engine(XopAction::ExtractSoap).run(&msg).unwrap_err();
        assert_eq!(err.to_string(), "no boundary found");
    }

    #[test]
    fn test_xml_part_content_type_checked() {
        let msg = message(&[("Content-Type: image/bmp", ENVELOPE)]);
        for action in [XopAction::Edit1, XopAction::ExtractSoap, XopAction::TransformToEmbedded] {
            let err = engine(action).run(&msg).unwrap_err();
            assert_eq!(err.to_string(), "unexpected content-type for part #1 (image/bmp)");
        }
    }

    #[test]
    fn test_custom_allowlists() {
        let msg = message(&[
            ("Content-Type: text/plain", ENVELOPE),
            ("Content-Type: image/bmp\r\nContent-ID: <att>", "BMP"),
        ]);
        let engine = XopEngine::new(EngineConfig {
            action: XopAction::TransformToEmbedded,
            xml_content_types: ContentTypeAllowlist::parse("text/plain"),
            attachment_content_types: ContentTypeAllowlist::parse("image/bmp"),
            username_tokens: UsernameTokenPolicy::RemoveAll,
        });
        assert!(engine.run(&msg).is_ok());
    }

    #[test]
    fn test_malformed_xml_is_unexpected() {
        let msg = message(&[
            ("Content-Type: text/xml", "<a><b></a>"),
            ("Content-Type: image/png", "x"),
        ]);
        let err = engine(XopAction::TransformToEmbedded).run(&msg).unwrap_err();
        assert!(!err.is_structural());
    }
}
