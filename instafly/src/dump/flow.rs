use std::{
    io::{self, Read},
    path::Path,
};

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use tracing::{debug, warn};

use super::tnetstring::{self, Value};
use crate::Error;

/// The parts of a recorded HTTP exchange that matter for collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFlow {
    pub host: String,
    /// Path including the query string, e.g. `/someone/?__a=1`.
    pub path: String,
    /// Response body with any `Content-Encoding` removed.
    pub body: Vec<u8>,
}

impl HttpFlow {
    /// Extracts a flow from a decoded mitmproxy flow dict. Returns `None` for
    /// anything that is not an HTTP flow with a response, and for responses
    /// whose body cannot be decoded.
    pub fn from_value(v: &Value) -> Option<Self> {
        if let Some(kind) = v.get("type") {
            if kind.as_str() != Some("http") {
                return None;
            }
        }
        let request = v.get("request")?;
        let response = v.get("response").filter(|r| !r.is_null())?;
        let host = request.get("host")?.as_str()?.to_string();
        let path = request.get("path")?.as_str()?.to_string();
        let raw = response.get("content")?.as_bytes()?;
        let encoding = header(response, "content-encoding");
        let body = match decode_content(encoding, raw) {
            Ok(body) => body,
            Err(err) => {
                warn!(%host, %path, ?encoding, %err, "skipping response with undecodable body");
                return None;
            }
        };
        Some(Self { host, path, body })
    }

    /// The url the request was made to, assuming https.
    pub fn url(&self) -> String {
        format!("https://{}{}", self.host, self.path)
    }

    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// First value of header `name` (case insensitive). mitmproxy stores headers
/// as a list of `[name, value]` pairs.
fn header<'v>(message: &'v Value, name: &str) -> Option<&'v str> {
    let Value::List(headers) = message.get("headers")? else {
        return None;
    };
    headers.iter().find_map(|h| match h {
        Value::List(pair) => match pair.as_slice() {
            [k, v] if k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(name)) => v.as_str(),
            _ => None,
        },
        _ => None,
    })
}

/// Undoes a `Content-Encoding`. `deflate` is tried as zlib first and then as a
/// raw deflate stream, since servers send both.
pub fn decode_content(encoding: Option<&str>, raw: &[u8]) -> io::Result<Vec<u8>> {
    let encoding = encoding.map(|e| e.trim().to_ascii_lowercase());
    let mut out = Vec::new();
    match encoding.as_deref() {
        None | Some("") | Some("identity") => return Ok(raw.to_vec()),
        Some("gzip") | Some("x-gzip") => {
            GzDecoder::new(raw).read_to_end(&mut out)?;
        }
        Some("deflate") => {
            if ZlibDecoder::new(raw).read_to_end(&mut out).is_err() {
                out.clear();
                DeflateDecoder::new(raw).read_to_end(&mut out)?;
            }
        }
        Some(other) => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported content encoding {other:?}"),
            ))
        }
    }
    Ok(out)
}

/// Decodes every HTTP flow with a response from `data`.
pub fn flows_from_bytes(data: &[u8]) -> Result<Vec<HttpFlow>, Error> {
    let values = tnetstring::parse_all(data)?;
    let total = values.len();
    let flows: Vec<HttpFlow> = values.iter().filter_map(HttpFlow::from_value).collect();
    debug!(total, http = flows.len(), "decoded flows");
    Ok(flows)
}

/// Reads a mitmproxy flow file.
pub fn read_flows<P: AsRef<Path>>(path: P) -> Result<Vec<HttpFlow>, Error> {
    let data = std::fs::read(path)?;
    flows_from_bytes(&data)
}
