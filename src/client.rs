//! Minimal client for the IOP open platform gateway.
//!
//! Every call carries the app key, a millisecond timestamp, the sign method
//! and an HMAC-SHA256 signature over the sorted parameters.

use crate::request::IopRequest;
use crate::sign::{self, SignMethod};
use anyhow::{bail, Context, Error};
use log::*;
use reqwest::{Client as HttpClient, Method};
use serde::Serialize;
use serde_json::Value;

const PARTNER_ID: &str = "iop-sdk-rust";

/// Gateway protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Path style (`/auth/token/create`): the API name is appended to the
    /// server URL and prefixed to the signed string.
    Gop,
    /// Method style (`aliexpress.affiliate.link.generate`): the API name is
    /// sent as the `method` parameter.
    Top,
}

pub struct IopClient {
    server_url: String,
    app_key: String,
    app_secret: String,
    sign_method: SignMethod,
    http: HttpClient,
}

impl IopClient {
    pub fn new(server_url: &str, app_key: &str, app_secret: &str) -> IopClient {
        IopClient {
            server_url: server_url.trim_end_matches('/').to_string(),
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            sign_method: SignMethod::default(),
            http: HttpClient::new(),
        }
    }

    pub fn with_http_client(mut self, http: HttpClient) -> IopClient {
        self.http = http;
        self
    }

    pub fn with_sign_method(mut self, method: SignMethod) -> IopClient {
        self.sign_method = method;
        self
    }

    /// Signs and sends `req`. Transport failures and non-2xx statuses are
    /// errors; an error code inside a 2xx reply is returned in the response.
    pub async fn execute(&self, req: &IopRequest, protocol: Protocol) -> Result<IopResponse, Error> {
        let mut params = req.api_params().clone();
        params.insert("app_key".to_string(), self.app_key.clone());
        params.insert(
            "timestamp".to_string(),
            chrono::Utc::now().timestamp_millis().to_string(),
        );
        params.insert(
            "sign_method".to_string(),
            self.sign_method.as_str().to_string(),
        );
        params.insert("partner_id".to_string(), PARTNER_ID.to_string());

        let (url, api_path) = match protocol {
            Protocol::Gop => (
                format!("{}{}", self.server_url, req.api_name()),
                Some(req.api_name()),
            ),
            Protocol::Top => {
                params.insert("method".to_string(), req.api_name().to_string());
                (self.server_url.clone(), None)
            }
        };

        debug!("string to sign: {}", sign::string_to_sign(api_path, &params));
        let signature = sign::sign(self.sign_method, &self.app_secret, api_path, &params);
        params.insert("sign".to_string(), signature);
        debug!("request parameters: {:?}", params);

        let builder = if req.http_method() == Method::GET {
            self.http.get(&url).query(&params)
        } else {
            self.http.request(req.http_method().clone(), &url).form(&params)
        };
        let http_req = builder.build().context("build request")?;

        let rsp = self.http.execute(http_req).await.context("execute request")?;
        let status = rsp.status();
        let body = rsp.text().await.context("read response body")?;
        debug!("response status: {}", status);
        if !status.is_success() {
            bail!("bad response status: {}: {}", status, body);
        }

        IopResponse::parse(body)
    }
}

/// Gateway reply: the envelope fields plus the raw body.
#[derive(Debug, Serialize)]
pub struct IopResponse {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub request_id: Option<String>,
    pub body: String,
}

impl IopResponse {
    pub fn parse(body: String) -> Result<IopResponse, Error> {
        let v: Value = serde_json::from_str(&body).context("json deserialize")?;
        let field = |name: &str| match v.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Ok(IopResponse {
            kind: field("type"),
            code: field("code"),
            message: field("message"),
            request_id: field("request_id"),
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.code.as_deref() == Some("0")
    }

    pub fn gop_response_body(&self) -> &str {
        &self.body
    }
}
