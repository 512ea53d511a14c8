use crate::client::{IopClient, IopResponse, Protocol};
use crate::request::IopRequest;
use anyhow::{bail, Context, Error};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use serde::Deserialize;
use std::io::{self, Write};

pub const DEFAULT_SERVER_URL: &str = "https://api-sg.aliexpress.com/rest";
pub const CREATE_TOKEN_API: &str = "/auth/token/create";
pub const REFRESH_TOKEN_API: &str = "/auth/token/refresh";

pub const AUTH_CODE_INSTRUCTIONS: &str = r"1. open in a browser: https://api-sg.aliexpress.com/oauth/authorize?response_type=code&force_auth=true&redirect_uri=<CALLBACK_URL>&client_id=<APP_KEY>
2. log in with the account the token is for and grant access
3. copy the `code` query parameter from the URL you are redirected to
4. exchange it right away; a code is short-lived and can be used only once";

pub fn create_token_request(code: &str) -> IopRequest {
    let mut req = IopRequest::new(CREATE_TOKEN_API);
    req.add_api_parameter("code", code);
    req
}

pub fn refresh_token_request(refresh_token: &str) -> IopRequest {
    let mut req = IopRequest::new(REFRESH_TOKEN_API);
    req.add_api_parameter("refresh_token", refresh_token);
    req
}

/// Exchanges an authorization code for an access token.
pub async fn create_token(c: &IopClient, code: &str) -> Result<IopResponse, Error> {
    c.execute(&create_token_request(code), Protocol::Gop)
        .await
        .context("create token")
}

/// Trades a refresh token for a new access token.
pub async fn refresh_token(c: &IopClient, refresh_token: &str) -> Result<IopResponse, Error> {
    c.execute(&refresh_token_request(refresh_token), Protocol::Gop)
        .await
        .context("refresh token")
}

/// Writes the JSON-encoded response followed by the raw body, or the error
/// message. Only failures writing to `out` are returned.
pub fn print_outcome<W: Write>(result: Result<IopResponse, Error>, out: &mut W) -> io::Result<()> {
    let rsp = match result {
        Ok(rsp) => rsp,
        Err(e) => return writeln!(out, "{:#}", e),
    };
    match serde_json::to_string(&rsp) {
        Ok(json) => {
            writeln!(out, "{}", json)?;
            writeln!(out, "{}", rsp.gop_response_body())
        }
        Err(e) => writeln!(out, "{}", e),
    }
}

/// Logs who the token belongs to and when it expires.
pub fn log_token(rsp: &IopResponse) {
    if !rsp.is_success() {
        warn!(
            "api error: code={} message={}",
            rsp.code.as_deref().unwrap_or(""),
            rsp.message.as_deref().unwrap_or("")
        );
        return;
    }
    match TokenPayload::from_response(rsp) {
        Ok(tok) => {
            let account = tok.account.as_deref().unwrap_or("unknown account");
            match tok.expires_at() {
                Some(at) => info!("token for {} expires at {}", account, at.to_rfc3339()),
                None => info!("token for {} has no expiry", account),
            }
        }
        Err(e) => warn!("{:#}", e),
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_expires_in: Option<i64>,
    /// Milliseconds since the epoch.
    pub expire_time: Option<i64>,
    /// Milliseconds since the epoch.
    pub refresh_token_valid_time: Option<i64>,
    pub user_id: Option<String>,
    pub account: Option<String>,
    pub account_platform: Option<String>,
    pub seller_id: Option<String>,
    pub havana_id: Option<String>,
    pub user_nick: Option<String>,
    pub sp: Option<String>,
    pub locale: Option<String>,
}

impl TokenPayload {
    pub fn from_response(rsp: &IopResponse) -> Result<TokenPayload, Error> {
        if !rsp.is_success() {
            bail!("api error: {}", rsp.code.as_deref().unwrap_or("missing code"));
        }
        serde_json::from_str(rsp.gop_response_body()).context("token json deserialize")
    }

    /// `expire_time` when present, else `expires_in` counted from now.
    /// `None` when neither is set or the value is out of range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if let Some(ms) = self.expire_time {
            return Utc.timestamp_millis_opt(ms).single();
        }
        let delta = Duration::try_seconds(self.expires_in?)?;
        Utc::now().checked_add_signed(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use mockito::{Matcher, Server};
    use serde_json::Value;

    const TOKEN_BODY: &str = r#"{"refresh_token_valid_time":1735689600000,"havana_id":"1","expire_time":1704067200000,"locale":"zh_CN","user_nick":"kr1234","access_token":"50000a","refresh_token":"50001b","user_id":"2","account_platform":"buyerApp","refresh_expires_in":0,"expires_in":2592000,"sp":"ae","seller_id":"3","account":"me@example.com","code":"0","request_id":"2101"}"#;

    #[test]
    fn create_request_has_only_code() {
        let req = create_token_request("3_513774_xyz");
        assert_eq!(req.api_name(), "/auth/token/create");
        assert_eq!(req.api_params().len(), 1);
        assert_eq!(req.api_params()["code"], "3_513774_xyz");
    }

    #[test]
    fn refresh_request_has_only_refresh_token() {
        let req = refresh_token_request("50001b");
        assert_eq!(req.api_name(), "/auth/token/refresh");
        assert_eq!(req.api_params().len(), 1);
        assert_eq!(req.api_params()["refresh_token"], "50001b");
    }

    #[test]
    fn prints_json_then_body() {
        let rsp = IopResponse::parse(TOKEN_BODY.to_string()).unwrap();
        let mut out = Vec::new();
        print_outcome(Ok(rsp), &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        let mut lines = out.lines();
        let json: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(json["code"], "0");
        assert_eq!(json["request_id"], "2101");
        assert_eq!(lines.next().unwrap(), TOKEN_BODY);
    }

    #[test]
    fn prints_error_message() {
        let mut out = Vec::new();
        let err = anyhow!("connection refused").context("create token");
        print_outcome(Err(err), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "create token: connection refused\n"
        );
    }

    #[test]
    fn parses_token_payload() {
        let rsp = IopResponse::parse(TOKEN_BODY.to_string()).unwrap();
        let tok = TokenPayload::from_response(&rsp).unwrap();
        assert_eq!(tok.access_token, "50000a");
        assert_eq!(tok.refresh_token.as_deref(), Some("50001b"));
        assert_eq!(tok.account.as_deref(), Some("me@example.com"));
        assert_eq!(
            tok.expires_at().unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn api_error_has_no_payload() {
        let rsp =
            IopResponse::parse(r#"{"type":"ISV","code":"InvalidCode","message":"m"}"#.to_string())
                .unwrap();
        assert!(TokenPayload::from_response(&rsp).is_err());
    }

    #[test]
    fn out_of_range_expiry_is_none() {
        let body = r#"{"access_token":"a","expires_in":9223372036854775807,"code":"0"}"#;
        let rsp = IopResponse::parse(body.to_string()).unwrap();
        let tok = TokenPayload::from_response(&rsp).unwrap();
        assert!(tok.expires_at().is_none());

        let body = r#"{"access_token":"a","expire_time":9223372036854775807,"code":"0"}"#;
        let rsp = IopResponse::parse(body.to_string()).unwrap();
        assert!(TokenPayload::from_response(&rsp).unwrap().expires_at().is_none());

        // Logging such a reply must not panic before it is printed.
        log_token(&rsp);
        let mut out = Vec::new();
        print_outcome(Ok(rsp), &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains(body));
    }

    #[test]
    fn expires_in_counts_from_now() {
        let body = r#"{"access_token":"a","expires_in":3600,"code":"0"}"#;
        let rsp = IopResponse::parse(body.to_string()).unwrap();
        let at = TokenPayload::from_response(&rsp).unwrap().expires_at().unwrap();
        assert!(at > Utc::now() + Duration::minutes(59));
    }

    #[tokio::test]
    async fn create_token_round_trip() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/auth/token/create")
            .match_body(Matcher::UrlEncoded("code".into(), "3_513774_xyz".into()))
            .with_status(200)
            .with_body(TOKEN_BODY)
            .create_async()
            .await;

        let client = IopClient::new(&format!("{}/rest", server.url()), "513774", "secret");
        let mut out = Vec::new();
        print_outcome(create_token(&client, "3_513774_xyz").await, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        let first = out.lines().next().unwrap();
        assert!(serde_json::from_str::<Value>(first).is_ok(), "{}", out);
        assert!(out.contains("50000a"));
    }

    #[tokio::test]
    async fn create_token_failure_is_printed() {
        // Nothing listens on port 1.
        let client = IopClient::new("http://127.0.0.1:1/rest", "513774", "secret");
        let mut out = Vec::new();
        print_outcome(create_token(&client, "code").await, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("create token: "));
    }
}
