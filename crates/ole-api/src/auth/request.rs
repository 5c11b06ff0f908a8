use url::Url;

use super::resolver::NONCE_PARAMETER;

/// Attribute holding the registration id the request was built for
pub const REGISTRATION_ID_ATTRIBUTE: &str = "registration_id";
/// Attribute holding the PKCE code verifier
pub const CODE_VERIFIER_ATTRIBUTE: &str = "code_verifier";

/// Ordered string parameters with unique keys
///
/// Inserting an existing key overwrites its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(Vec<(String, String)>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();

        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outbound OAuth2 authorization request (Authorization Code grant)
///
/// `additional_parameters` are sent to the provider after the standard
/// parameters; `attributes` stay on the server and are read back when the
/// provider redirects to the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    authorization_uri: Url,
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    state: String,
    additional_parameters: Parameters,
    attributes: Parameters,
}

impl AuthorizationRequest {
    pub fn new(
        authorization_uri: Url,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            authorization_uri,
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            state: state.into(),
            additional_parameters: Parameters::new(),
            attributes: Parameters::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_additional_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.additional_parameters.insert(key, value);
        self
    }

    /// Replace the whole additional parameter set
    pub fn with_additional_parameters(mut self, parameters: Parameters) -> Self {
        self.additional_parameters = parameters;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn authorization_uri(&self) -> &Url {
        &self.authorization_uri
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn additional_parameters(&self) -> &Parameters {
        &self.additional_parameters
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }

    /// The OIDC nonce sent with this request, if any
    pub fn nonce(&self) -> Option<&str> {
        self.additional_parameters.get(NONCE_PARAMETER)
    }

    /// Full URL the user agent is redirected to
    pub fn authorization_request_uri(&self) -> Url {
        let mut uri = self.authorization_uri.clone();
        {
            let mut query = uri.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query
                .append_pair("state", &self.state)
                .append_pair("redirect_uri", &self.redirect_uri);
            for (key, value) in self.additional_parameters.iter() {
                query.append_pair(key, value);
            }
        }
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new(
            Url::parse("https://auth.example.com/as/authorize").unwrap(),
            "client-1",
            "http://localhost:8080/login/oauth2/code/pingone",
            "state-1",
        )
        .with_scopes(vec!["openid".to_string(), "profile".to_string()])
        .with_additional_parameter("code_challenge", "abc")
        .with_attribute(CODE_VERIFIER_ATTRIBUTE, "verifier")
    }

    #[test]
    fn test_parameters_overwrite_in_place() {
        let mut params = Parameters::new();
        assert_eq!(params.insert("a", "1"), None);
        assert_eq!(params.insert("b", "2"), None);
        assert_eq!(params.insert("a", "3"), Some("1".to_string()));

        let entries: Vec<_> = params.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_authorization_request_uri() {
        let uri = request()
            .with_additional_parameter("prompt", "login")
            .authorization_request_uri();

        assert_eq!(uri.host_str(), Some("auth.example.com"));
        assert_eq!(uri.path(), "/as/authorize");

        let pairs: Vec<(String, String)> = uri.query_pairs().into_owned().collect();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "response_type",
                "client_id",
                "scope",
                "state",
                "redirect_uri",
                "code_challenge",
                "prompt"
            ]
        );
        assert_eq!(pairs[2].1, "openid profile");
        assert_eq!(pairs[4].1, "http://localhost:8080/login/oauth2/code/pingone");
    }

    #[test]
    fn test_attributes_are_not_sent() {
        let uri = request().authorization_request_uri();
        assert!(!uri.query_pairs().any(|(k, _)| k == CODE_VERIFIER_ATTRIBUTE));
        assert_eq!(request().attribute(CODE_VERIFIER_ATTRIBUTE), Some("verifier"));
    }

    #[test]
    fn test_existing_query_is_preserved() {
        let request = AuthorizationRequest::new(
            Url::parse("https://auth.example.com/authorize?tenant=acme").unwrap(),
            "client-1",
            "http://localhost/cb",
            "s",
        );
        let uri = request.authorization_request_uri();
        assert_eq!(uri.query_pairs().next().unwrap().0, "tenant");
        assert!(!uri.query_pairs().any(|(k, _)| k == "scope"));
    }
}
