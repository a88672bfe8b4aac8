//! Response construction and S3-style error XML.

use std::io;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

/// Response type produced by the service.
pub type PolicyResponse = http::Response<Full<Bytes>>;

/// An error rendered to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody<'a> {
    /// HTTP status.
    pub status: StatusCode,
    /// S3-style error code.
    pub code: &'a str,
    /// Human-readable message.
    pub message: String,
    /// The addressed resource, if any.
    pub resource: Option<&'a str>,
}

/// Build an `<Error>` XML response.
pub fn error_response(err: &ErrorBody<'_>, request_id: &str) -> PolicyResponse {
    let xml = error_to_xml(err.code, &err.message, err.resource, request_id);
    build(
        http::Response::builder()
            .status(err.status)
            .header(http::header::CONTENT_TYPE, "application/xml"),
        Bytes::from(xml),
    )
}

/// `204 No Content`.
pub fn no_content() -> PolicyResponse {
    build(
        http::Response::builder().status(StatusCode::NO_CONTENT),
        Bytes::new(),
    )
}

/// `200 OK` with a JSON body.
pub fn json(body: Bytes) -> PolicyResponse {
    build(
        http::Response::builder()
            .status(StatusCode::OK)
            .header(http::header::CONTENT_TYPE, "application/json"),
        body,
    )
}

fn build(builder: http::response::Builder, body: Bytes) -> PolicyResponse {
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to build response");
        let mut fallback = http::Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// Serialize an S3 error document.
pub fn error_to_xml(code: &str, message: &str, resource: Option<&str>, request_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error_xml(&mut buf, code, message, resource, request_id) {
        tracing::error!(error = %e, "failed to serialize error XML");
        buf.clear();
    }
    buf
}

fn write_error_xml(
    buf: &mut Vec<u8>,
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.create_element("Error").write_inner_content(|w| {
        w.create_element("Code")
            .write_text_content(BytesText::new(code))?;
        w.create_element("Message")
            .write_text_content(BytesText::new(message))?;
        if let Some(res) = resource {
            w.create_element("Resource")
                .write_text_content(BytesText::new(res))?;
        }
        w.create_element("RequestId")
            .write_text_content(BytesText::new(request_id))?;
        Ok(())
    })?;

    Ok(())
}
