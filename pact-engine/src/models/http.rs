use super::{
    body::OptionalBody, content_type::ContentType, generators::Generators,
    interaction::Comments, matchingrules::MatchingRules, provider_state::ProviderState,
};
use std::collections::BTreeMap;

pub type Headers = BTreeMap<String, Vec<String>>;
pub type Query = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<Query>,
    pub headers: Option<Headers>,
    pub body: OptionalBody,
    pub matching_rules: MatchingRules,
    pub generators: Generators,
}

impl Default for HttpRequest {
    fn default() -> Self {
        HttpRequest {
            method: "GET".into(),
            path: "/".into(),
            query: None,
            headers: None,
            body: OptionalBody::Missing,
            matching_rules: MatchingRules::default(),
            generators: Generators::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Option<Headers>,
    pub body: OptionalBody,
    pub matching_rules: MatchingRules,
    pub generators: Generators,
}

impl Default for HttpResponse {
    fn default() -> Self {
        HttpResponse {
            status: 200,
            headers: None,
            body: OptionalBody::Missing,
            matching_rules: MatchingRules::default(),
            generators: Generators::default(),
        }
    }
}

/// Shared header handling of requests and responses.
pub trait HttpPart {
    fn headers(&self) -> &Option<Headers>;
    fn headers_mut(&mut self) -> &mut Option<Headers>;
    fn body(&self) -> &OptionalBody;

    /// Header lookup ignoring the case of the name.
    fn lookup_header(&self, name: &str) -> Option<&Vec<String>> {
        self.headers()
            .as_ref()?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    fn has_header(&self, name: &str) -> bool {
        self.lookup_header(name).is_some()
    }

    fn add_header<S: Into<String>>(&mut self, name: &str, value: S) {
        let headers = self.headers_mut().get_or_insert_with(BTreeMap::new);
        let key = headers
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_string());
        headers.entry(key).or_default().push(value.into());
    }

    fn set_header<S: Into<String>>(&mut self, name: &str, value: S) {
        let headers = self.headers_mut().get_or_insert_with(BTreeMap::new);
        headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
        headers.insert(name.to_string(), vec![value.into()]);
    }

    fn remove_header(&mut self, name: &str) {
        if let Some(headers) = self.headers_mut() {
            headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
        }
    }

    /// The declared content type header, falling back to the body's type.
    fn content_type(&self) -> Option<ContentType> {
        self.lookup_header("content-type")
            .and_then(|values| values.first())
            .and_then(|value| value.parse().ok())
            .or_else(|| self.body().resolved_content_type())
    }
}

impl HttpPart for HttpRequest {
    fn headers(&self) -> &Option<Headers> {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Option<Headers> {
        &mut self.headers
    }

    fn body(&self) -> &OptionalBody {
        &self.body
    }
}

impl HttpPart for HttpResponse {
    fn headers(&self) -> &Option<Headers> {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Option<Headers> {
        &mut self.headers
    }

    fn body(&self) -> &OptionalBody {
        &self.body
    }
}

impl HttpRequest {
    /// The query string form of the query parameters, `a=1&a=2&b=x`.
    pub fn query_string(&self) -> Option<String> {
        let query = self.query.as_ref().filter(|q| !q.is_empty())?;
        Some(
            query
                .iter()
                .flat_map(|(key, values)| {
                    let key = url::form_urlencoded::byte_serialize(key.as_bytes()).collect::<String>();
                    if values.is_empty() {
                        vec![key]
                    } else {
                        values
                            .iter()
                            .map(|value| {
                                format!(
                                    "{}={}",
                                    key,
                                    url::form_urlencoded::byte_serialize(value.as_bytes())
                                        .collect::<String>()
                                )
                            })
                            .collect()
                    }
                })
                .collect::<Vec<_>>()
                .join("&"),
        )
    }

    /// Path plus query string.
    pub fn path_and_query(&self) -> String {
        match self.query_string() {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// Parses a query string into the multi-valued map form.
pub fn parse_query_string(query: &str) -> Option<Query> {
    if query.is_empty() {
        return None;
    }

    let mut parsed: Query = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        parsed.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    Some(parsed)
}

/// A request/response interaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpInteraction {
    pub id: Option<String>,
    pub key: Option<String>,
    pub description: String,
    pub provider_states: Vec<ProviderState>,
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub pending: bool,
    pub comments: Comments,
}

impl HttpInteraction {
    pub fn new<S: Into<String>>(description: S) -> Self {
        HttpInteraction {
            description: description.into(),
            ..HttpInteraction::default()
        }
    }
}
