use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::domain::email::{Message, MessageId, MessageSummary};
use crate::error::{DispenserError, Result};
use crate::mail::decoders::split_address;

pub const DEFAULT_API_BASE: &str = "https://www.1secmail.com/api/v1/";

/// The remote temporary-mailbox service.
pub trait MailboxApi: Send + Sync {
    fn gen_random_mailbox(&self) -> Result<String>;
    fn get_messages(&self, address: &str) -> Result<Vec<MessageSummary>>;
    fn read_message(&self, address: &str, id: MessageId) -> Result<Message>;
    /// Attachments are served as raw bytes behind a URL, not JSON.
    fn download_url(&self, address: &str, id: MessageId, file: &str) -> Result<Url>;
    fn download(&self, address: &str, id: MessageId, file: &str) -> Result<Vec<u8>>;
}

pub struct HttpMailboxApi {
    base: Url,
    http: reqwest::blocking::Client,
}

impl HttpMailboxApi {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| DispenserError::Api(format!("invalid api base '{base}': {e}")))?;
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("mail_dispenser/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { base, http })
    }

    fn action_url(&self, action: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("action", action);
            for (k, v) in params {
                q.append_pair(k, v);
            }
        }
        url
    }

    fn mailbox_url(&self, action: &str, address: &str, extra: &[(&str, &str)]) -> Result<Url> {
        let (login, domain) = split_address(address)
            .ok_or_else(|| DispenserError::Api(format!("malformed address '{address}'")))?;
        let mut params = vec![("login", login), ("domain", domain)];
        params.extend_from_slice(extra);
        Ok(self.action_url(action, &params))
    }

    fn get_json(&self, url: Url) -> Result<Value> {
        debug!("GET {url}");
        let resp = self.http.get(url).send()?.error_for_status()?;
        Ok(resp.json::<Value>()?)
    }
}

impl MailboxApi for HttpMailboxApi {
    fn gen_random_mailbox(&self) -> Result<String> {
        let url = self.action_url("genRandomMailbox", &[("count", "1")]);
        parse_generated(self.get_json(url)?)
    }

    fn get_messages(&self, address: &str) -> Result<Vec<MessageSummary>> {
        let url = self.mailbox_url("getMessages", address, &[])?;
        expect_array(self.get_json(url)?)
    }

    fn read_message(&self, address: &str, id: MessageId) -> Result<Message> {
        let id = id.to_string();
        let url = self.mailbox_url("readMessage", address, &[("id", &id)])?;
        let value = self.get_json(url)?;
        if !value.is_object() {
            return Err(DispenserError::Api(format!(
                "readMessage returned {}",
                kind(&value)
            )));
        }
        decode(value)
    }

    fn download_url(&self, address: &str, id: MessageId, file: &str) -> Result<Url> {
        let id = id.to_string();
        self.mailbox_url("download", address, &[("id", &id), ("file", file)])
    }

    fn download(&self, address: &str, id: MessageId, file: &str) -> Result<Vec<u8>> {
        let url = self.download_url(address, id, file)?;
        debug!("GET {url}");
        let bytes = self.http.get(url).send()?.error_for_status()?.bytes()?;
        Ok(bytes.to_vec())
    }
}

fn parse_generated(value: Value) -> Result<String> {
    let list: Vec<String> = expect_array(value)?;
    match list.into_iter().next() {
        Some(addr) if split_address(&addr).is_some() => Ok(addr),
        Some(addr) => Err(DispenserError::Api(format!(
            "generated address '{addr}' is malformed"
        ))),
        None => Err(DispenserError::Api("no address was generated".into())),
    }
}

fn expect_array<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    if !value.is_array() {
        return Err(DispenserError::Api(format!(
            "expected an array, got {}",
            kind(&value)
        )));
    }
    decode(value)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| DispenserError::Api(format!("bad response: {e}")))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
