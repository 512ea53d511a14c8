use reqwest::Method;
use std::collections::BTreeMap;

/// A single API call: the API name plus its business parameters.
///
/// Parameters are kept sorted by name, which is the order the gateway
/// expects them in when computing the signature.
#[derive(Debug, Clone)]
pub struct IopRequest {
    api_name: String,
    api_params: BTreeMap<String, String>,
    http_method: Method,
}

impl IopRequest {
    pub fn new(api_name: &str) -> IopRequest {
        IopRequest {
            api_name: api_name.to_string(),
            api_params: BTreeMap::new(),
            http_method: Method::POST,
        }
    }

    pub fn set_api_name(&mut self, api_name: &str) {
        self.api_name = api_name.to_string();
    }

    /// Adds a business parameter, replacing any earlier value for `key`.
    pub fn add_api_parameter(&mut self, key: &str, value: &str) {
        self.api_params.insert(key.to_string(), value.to_string());
    }

    pub fn set_http_method(&mut self, method: Method) {
        self.http_method = method;
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn api_params(&self) -> &BTreeMap<String, String> {
        &self.api_params
    }

    pub fn http_method(&self) -> &Method {
        &self.http_method
    }
}
