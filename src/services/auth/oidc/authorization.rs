//! OAuth2 authorization request (the browser redirect to the identity provider).

use std::collections::BTreeMap;

use url::Url;

pub const AUDIENCE_PARAM: &str = "audience";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub authorization_uri: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: String,
    pub nonce: String,
    /// Extra query parameters (PKCE, audience, ...), sent after the standard ones.
    pub additional_parameters: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.additional_parameters.get(name).map(String::as_str)
    }

    /// Full redirect URL for the user agent.
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.authorization_uri)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", &self.state)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("nonce", &self.nonce);
            for (name, value) in &self.additional_parameters {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

/// Return `request` with the `audience` parameter set to `audience`.
///
/// Applied to every authorization request. An empty audience is still sent
/// (`audience=`); every other field is left as generated.
pub fn with_audience(request: AuthorizationRequest, audience: &str) -> AuthorizationRequest {
    let mut additional_parameters = request.additional_parameters;
    additional_parameters.insert(AUDIENCE_PARAM.to_string(), audience.to_string());
    AuthorizationRequest {
        additional_parameters,
        ..request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(redirect_uri: &str) -> AuthorizationRequest {
        AuthorizationRequest {
            authorization_uri: "https://idp.example.com/authorize".into(),
            client_id: "client-1".into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec!["openid".into(), "email".into()],
            state: "st".into(),
            nonce: "n0".into(),
            additional_parameters: BTreeMap::from([(
                "code_challenge_method".to_string(),
                "S256".to_string(),
            )]),
        }
    }

    #[test]
    fn audience_is_added_without_touching_other_fields() {
        let original = request("https://gw.example.com/login/oauth2/code/okta");
        let augmented = with_audience(original.clone(), "https://api.example.com");

        assert_eq!(augmented.parameter(AUDIENCE_PARAM), Some("https://api.example.com"));
        assert_eq!(augmented.client_id, original.client_id);
        assert_eq!(augmented.redirect_uri, original.redirect_uri);
        assert_eq!(augmented.scopes, original.scopes);
        assert_eq!(augmented.state, original.state);
        assert_eq!(augmented.nonce, original.nonce);
        assert_eq!(augmented.parameter("code_challenge_method"), Some("S256"));
    }

    #[test]
    fn empty_audience_is_still_sent() {
        let augmented = with_audience(request("https://gw/cb"), "");
        assert_eq!(augmented.parameter(AUDIENCE_PARAM), Some(""));

        let url = augmented.to_url().unwrap();
        assert!(url.query_pairs().any(|(k, v)| k == "audience" && v.is_empty()));
    }

    #[test]
    fn existing_audience_is_replaced() {
        let mut original = request("https://gw/cb");
        original
            .additional_parameters
            .insert(AUDIENCE_PARAM.into(), "stale".into());
        let augmented = with_audience(original, "fresh");
        assert_eq!(augmented.parameter(AUDIENCE_PARAM), Some("fresh"));
    }

    #[test]
    fn url_carries_standard_and_extra_parameters() {
        let url = with_audience(request("https://gw/cb"), "api")
            .to_url()
            .unwrap();
        let pairs: BTreeMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "client-1");
        assert_eq!(pairs["scope"], "openid email");
        assert_eq!(pairs["redirect_uri"], "https://gw/cb");
        assert_eq!(pairs["audience"], "api");
    }
}
