use super::{
    body::OptionalBody,
    content_type::ContentType,
    generators::Generators,
    http::{HttpPart, HttpRequest, HttpResponse},
    integration_json::{self, Extracted},
    interaction::{Interaction, InteractionKind},
    matchingrules::{Category, MatchingRule, MatchingRules, RuleLogic},
    message::MessageContents,
    path_exp::DocPath,
    provider_state::{merge_provider_state, ProviderState},
    PactSpecification,
};
use crate::{
    error::Error,
    generators::{generate_message, GeneratorContext},
    pactfile,
};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;
use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    panic::{self, AssertUnwindSafe},
};
use tracing::{debug, warn};

/// Index of an interaction inside its pact.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InteractionHandle(usize);

impl InteractionHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Which half of an interaction a builder call applies to. For messages the
/// request is the message contents (or the request of a synchronous message)
/// and the response is the latest synchronous response.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InteractionPart {
    Request,
    Response,
}

/// A contract between a consumer and a provider.
#[derive(Debug, Clone)]
pub struct Pact {
    pub consumer: String,
    pub provider: String,
    pub specification: PactSpecification,
    pub interactions: Vec<Interaction>,
    /// `namespace -> key -> value`, written under the file's `metadata`.
    pub metadata: BTreeMap<String, BTreeMap<String, Value>>,
    locked: bool,
}

impl PartialEq for Pact {
    fn eq(&self, other: &Self) -> bool {
        self.consumer == other.consumer
            && self.provider == other.provider
            && self.specification == other.specification
            && self.interactions == other.interactions
            && self.metadata == other.metadata
    }
}

impl Pact {
    pub fn new<C: Into<String>, P: Into<String>>(
        consumer: C,
        provider: P,
        specification: PactSpecification,
    ) -> Self {
        Pact {
            consumer: consumer.into(),
            provider: provider.into(),
            specification,
            interactions: Vec::new(),
            metadata: BTreeMap::new(),
            locked: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Set once a mock server has been started from this pact.
    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    fn check_unlocked(&self) -> Result<(), Error> {
        if self.locked {
            Err(Error::invalid_state(format!(
                "Pact between {} and {} is locked by a running mock server",
                self.consumer, self.provider
            )))
        } else {
            Ok(())
        }
    }

    /// Adds a new interaction. From V3 on descriptions are unique, so asking
    /// for an existing description returns that interaction.
    pub fn add_interaction<S: Into<String>>(
        &mut self,
        description: S,
        kind: InteractionKind,
    ) -> Result<InteractionHandle, Error> {
        self.check_unlocked()?;
        let description = description.into();

        if self.specification >= PactSpecification::V3 {
            if let Some(index) = self
                .interactions
                .iter()
                .position(|i| i.description() == description && i.kind() == kind)
            {
                debug!("Re-using interaction '{}'", description);
                return Ok(InteractionHandle(index));
            }
        }

        if kind != InteractionKind::Http && !self.specification.supports_messages() {
            debug!(
                "Upgrading pact to V3 to hold message interaction '{}'",
                description
            );
            self.specification = PactSpecification::V3;
        }
        if kind == InteractionKind::SyncMessage {
            self.specification = PactSpecification::V4;
        }

        self.interactions.push(Interaction::new(description, kind));
        Ok(InteractionHandle(self.interactions.len() - 1))
    }

    pub fn upon_receiving<S: Into<String>>(&mut self, description: S) -> Result<InteractionHandle, Error> {
        self.add_interaction(description, InteractionKind::Http)
    }

    pub fn interaction(&self, handle: InteractionHandle) -> Option<&Interaction> {
        self.interactions.get(handle.0)
    }

    /// A builder for the interaction, or `InvalidState` once the pact is
    /// locked or the handle does not belong to this pact.
    pub fn interaction_mut(&mut self, handle: InteractionHandle) -> Result<InteractionBuilder<'_>, Error> {
        self.check_unlocked()?;
        let specification = self.specification;
        let interaction = self
            .interactions
            .get_mut(handle.0)
            .ok_or_else(|| Error::invalid_state(format!("No interaction with index {}", handle.0)))?;
        Ok(InteractionBuilder {
            interaction,
            specification,
        })
    }

    pub fn with_metadata<N: Into<String>, K: Into<String>>(
        &mut self,
        namespace: N,
        key: K,
        value: Value,
    ) -> Result<(), Error> {
        self.check_unlocked()?;
        self.metadata
            .entry(namespace.into())
            .or_default()
            .insert(key.into(), value);
        Ok(())
    }

    pub fn http_interactions(&self) -> impl Iterator<Item = &super::http::HttpInteraction> {
        self.interactions.iter().filter_map(|i| i.as_http())
    }

    pub fn has_messages(&self) -> bool {
        self.interactions
            .iter()
            .any(|i| i.kind() != InteractionKind::Http)
    }

    /// Hands the contents and metadata of every `kind` message to the
    /// consumer's `handler`, after consumer-side generators are applied. For
    /// synchronous messages that is the request. Messages without contents
    /// are skipped. A handler error or panic fails only its own message.
    pub fn verify_messages<F, E>(
        &self,
        kind: InteractionKind,
        mut handler: F,
    ) -> Result<Vec<MessageHandlingFailure>, Error>
    where
        F: FnMut(&OptionalBody, &BTreeMap<String, Value>) -> Result<(), E>,
        E: fmt::Display,
    {
        if kind == InteractionKind::Http {
            return Err(Error::configuration("Only message interactions can be handed to a message handler"));
        }
        let context = GeneratorContext::consumer(None);
        let mut failures = Vec::new();
        for interaction in self.interactions.iter().filter(|i| i.kind() == kind) {
            let contents = match interaction {
                Interaction::AsyncMessage(message) => &message.contents,
                Interaction::SyncMessage(message) => &message.request,
                Interaction::Http(_) => continue,
            };
            if contents.contents.is_missing() {
                warn!("Message '{}' has no contents", interaction.description());
                continue;
            }

            let message = generate_message(contents, &context);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&message.contents, &message.metadata)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            debug!("Handler rejected message '{}': {}", interaction.description(), error);
            failures.push(MessageHandlingFailure {
                description: interaction.description().to_string(),
                message: error,
            });
        }
        Ok(failures)
    }

    /// `<consumer>-<provider>.json`
    pub fn default_file_name(&self) -> String {
        format!("{}-{}.json", self.consumer, self.provider)
    }

    pub fn to_json(&self, specification: PactSpecification) -> Result<Value, Error> {
        pactfile::encode(self, specification)
    }

    pub fn from_json(document: &Value) -> Result<Pact, Error> {
        pactfile::decode(document)
    }
}

/// A message the consumer's handler could not process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandlingFailure {
    pub description: String,
    pub message: String,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "The message handler panicked".to_string()
    }
}

/// Mutable view of one request, response or message payload.
enum PartMut<'b> {
    Request(&'b mut HttpRequest),
    Response(&'b mut HttpResponse),
    Message(&'b mut MessageContents),
}

impl<'b> PartMut<'b> {
    fn rules(&mut self) -> &mut MatchingRules {
        match self {
            PartMut::Request(r) => &mut r.matching_rules,
            PartMut::Response(r) => &mut r.matching_rules,
            PartMut::Message(m) => &mut m.matching_rules,
        }
    }

    fn generators(&mut self) -> &mut Generators {
        match self {
            PartMut::Request(r) => &mut r.generators,
            PartMut::Response(r) => &mut r.generators,
            PartMut::Message(m) => &mut m.generators,
        }
    }

    fn set_body(&mut self, body: OptionalBody) {
        match self {
            PartMut::Request(r) => r.body = body,
            PartMut::Response(r) => r.body = body,
            PartMut::Message(m) => m.contents = body,
        }
    }

    /// Records the content type as a header (HTTP) or metadata entry
    /// (messages), unless one was given explicitly.
    fn declare_content_type(&mut self, content_type: &ContentType, replace: bool) {
        let value = content_type.to_string();
        match self {
            PartMut::Request(r) if replace || !r.has_header("Content-Type") => {
                r.set_header("Content-Type", value)
            }
            PartMut::Response(r) if replace || !r.has_header("Content-Type") => {
                r.set_header("Content-Type", value)
            }
            PartMut::Message(m) => {
                let declared = m
                    .metadata
                    .keys()
                    .any(|k| k.eq_ignore_ascii_case("contentType") || k.eq_ignore_ascii_case("content-type"));
                if replace || !declared {
                    m.metadata
                        .retain(|k, _| !k.eq_ignore_ascii_case("contentType") && !k.eq_ignore_ascii_case("content-type"));
                    m.metadata.insert("contentType".into(), Value::String(value));
                }
            }
            _ => {}
        }
    }

    fn declared_content_type(&self) -> Option<ContentType> {
        match self {
            PartMut::Request(r) => r.lookup_header("Content-Type").and_then(|v| v.first()).and_then(|v| v.parse().ok()),
            PartMut::Response(r) => r.lookup_header("Content-Type").and_then(|v| v.first()).and_then(|v| v.parse().ok()),
            PartMut::Message(m) => m.content_type(),
        }
    }

    fn merge_extracted(&mut self, extracted: Extracted) {
        let category = extracted.rules.name;
        if !extracted.rules.is_empty() {
            let target = self.rules().add_category(category);
            target.rules.extend(extracted.rules.rules);
        }
        self.generators().merge(&extracted.generators);
    }
}

/// Mutates one interaction of an unlocked pact.
pub struct InteractionBuilder<'a> {
    interaction: &'a mut Interaction,
    specification: PactSpecification,
}

impl<'a> InteractionBuilder<'a> {
    pub fn interaction(&self) -> &Interaction {
        self.interaction
    }

    pub fn given<S: Into<String>>(&mut self, state: S) -> &mut Self {
        merge_provider_state(
            self.interaction.provider_states_mut(),
            ProviderState::new(state),
        );
        self
    }

    pub fn given_with_params<S: Into<String>>(
        &mut self,
        state: S,
        params: BTreeMap<String, Value>,
    ) -> &mut Self {
        merge_provider_state(
            self.interaction.provider_states_mut(),
            ProviderState::with_params(state, params),
        );
        self
    }

    /// Sets the method and path of an HTTP request. The path may be a
    /// serialised matcher definition.
    pub fn with_request(&mut self, method: &str, path: &str) -> Result<&mut Self, Error> {
        let mut extracted = Extracted::new(Category::Path);
        let path = integration_json::process_string(path, &DocPath::empty(), &mut extracted)?;
        self.require_http("with_request")?;
        let mut part = self.part(InteractionPart::Request)?;
        if let PartMut::Request(request) = &mut part {
            request.method = method.to_uppercase();
            request.path = path;
        }
        part.merge_extracted(extracted);
        Ok(self)
    }

    /// Appends a value to a query parameter.
    pub fn with_query_parameter(&mut self, name: &str, value: &str) -> Result<&mut Self, Error> {
        let mut extracted = Extracted::new(Category::Query);
        let value = integration_json::process_string(value, &DocPath::field(name), &mut extracted)?;
        self.require_http("with_query_parameter")?;
        let mut part = self.part(InteractionPart::Request)?;
        if let PartMut::Request(request) = &mut part {
            request
                .query
                .get_or_insert_with(BTreeMap::new)
                .entry(name.to_string())
                .or_default()
                .push(value);
        }
        part.merge_extracted(extracted);
        Ok(self)
    }

    /// Appends a header value. For messages the header becomes a metadata
    /// entry.
    pub fn with_header(&mut self, part: InteractionPart, name: &str, value: &str) -> Result<&mut Self, Error> {
        let category = match self.interaction.kind() {
            InteractionKind::Http => Category::Header,
            _ => Category::Metadata,
        };
        let mut extracted = Extracted::new(category);
        let value = integration_json::process_string(value, &DocPath::field(name), &mut extracted)?;
        let mut target = self.part(part)?;
        match &mut target {
            PartMut::Request(request) => request.add_header(name, value),
            PartMut::Response(response) => response.add_header(name, value),
            PartMut::Message(message) => {
                message.metadata.insert(name.to_string(), Value::String(value));
            }
        }
        target.merge_extracted(extracted);
        Ok(self)
    }

    /// Sets the body. JSON bodies may embed matcher definitions; the stored
    /// body is the compact example document.
    pub fn with_body(
        &mut self,
        part: InteractionPart,
        content_type: Option<&str>,
        body: &str,
    ) -> Result<&mut Self, Error> {
        let explicit = content_type.is_some();
        let mut target = self.part(part)?;
        let declared = match content_type {
            Some(content_type) => Some(content_type.parse::<ContentType>()?),
            None => target.declared_content_type(),
        };
        let content_type = declared
            .or_else(|| ContentType::detect(body.as_bytes()))
            .unwrap_or_else(ContentType::text);

        if body.is_empty() {
            target.set_body(OptionalBody::Empty);
            return Ok(self);
        }

        let body = if content_type.is_json() {
            match serde_json::from_str::<Value>(body) {
                Ok(json) => {
                    let mut extracted = Extracted::new(Category::Body);
                    let example = integration_json::process_json(&json, &mut extracted)?;
                    target.merge_extracted(extracted);
                    OptionalBody::Present(example.to_string().into_bytes(), Some(content_type.clone()))
                }
                Err(err) => {
                    debug!("Body declared as {} is not valid JSON: {}", content_type, err);
                    OptionalBody::Present(body.as_bytes().to_vec(), Some(content_type.clone()))
                }
            }
        } else {
            OptionalBody::Present(body.as_bytes().to_vec(), Some(content_type.clone()))
        };

        target.set_body(body);
        target.declare_content_type(&content_type, explicit);
        Ok(self)
    }

    /// Sets a binary body, matched on its content type only.
    pub fn with_binary_body(
        &mut self,
        part: InteractionPart,
        content_type: &str,
        body: &[u8],
    ) -> Result<&mut Self, Error> {
        let content_type = content_type.parse::<ContentType>()?;
        let mut target = self.part(part)?;
        target.set_body(OptionalBody::present(body.to_vec(), Some(content_type.clone())));
        target.declare_content_type(&content_type, true);
        target.rules().add_rule(
            Category::Body,
            DocPath::root(),
            MatchingRule::ContentType(content_type.to_string()),
        );
        Ok(self)
    }

    /// Sets a `multipart/form-data` body with one file part.
    pub fn with_multipart_file(
        &mut self,
        part: InteractionPart,
        content_type: &str,
        part_name: &str,
        file_name: &str,
        contents: &[u8],
    ) -> Result<&mut Self, Error> {
        let file_type = content_type.parse::<ContentType>()?;
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();

        let mut body = Vec::with_capacity(contents.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part_name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file_type).as_bytes());
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let multipart: ContentType = format!("multipart/form-data; boundary={}", boundary).parse()?;
        let mut target = self.part(part)?;
        target.set_body(OptionalBody::Present(body, Some(multipart.clone())));
        target.declare_content_type(&multipart, true);
        target.rules().add_rule(
            Category::Body,
            DocPath::root().join(part_name),
            MatchingRule::ContentType(file_type.to_string()),
        );
        target.rules().add_rule(
            Category::Header,
            DocPath::field("Content-Type"),
            MatchingRule::regex(r"multipart/form-data;(\s*charset=[^;]*;)?\s*boundary=.*"),
        );
        Ok(self)
    }

    pub fn will_respond_with(&mut self, status: u16) -> Result<&mut Self, Error> {
        self.require_http("will_respond_with")?;
        if let PartMut::Response(response) = self.part(InteractionPart::Response)? {
            response.status = status;
        }
        Ok(self)
    }

    /// Adds a metadata entry to a message. String values may be serialised
    /// matcher definitions.
    pub fn with_metadata(&mut self, part: InteractionPart, key: &str, value: Value) -> Result<&mut Self, Error> {
        let mut extracted = Extracted::new(Category::Metadata);
        let value = match &value {
            Value::String(s) => Value::String(integration_json::process_string(
                s,
                &DocPath::field(key),
                &mut extracted,
            )?),
            other if integration_json::is_matcher_definition(other) => {
                let mut nested = Extracted::new(Category::Body);
                let example = integration_json::process_json(other, &mut nested)?;
                for (_, list) in nested.rules.rules {
                    extracted.rules.add_rule_list(DocPath::field(key), list);
                }
                example
            }
            other => other.clone(),
        };
        if self.interaction.kind() == InteractionKind::Http {
            return Err(Error::invalid_state(format!(
                "with_metadata needs a message interaction, '{}' is HTTP",
                self.interaction.description()
            )));
        }
        let mut target = self.part(part)?;
        if let PartMut::Message(message) = &mut target {
            message.metadata.insert(key.to_string(), value);
        }
        target.merge_extracted(extracted);
        Ok(self)
    }

    /// Sets the contents of an asynchronous message or the request of a
    /// synchronous one.
    pub fn with_message_contents(&mut self, content_type: Option<&str>, contents: &str) -> Result<&mut Self, Error> {
        if self.interaction.kind() == InteractionKind::Http {
            return Err(Error::invalid_state(format!(
                "'{}' is an HTTP interaction and has no message contents",
                self.interaction.description()
            )));
        }
        self.with_body(InteractionPart::Request, content_type, contents)
    }

    /// Appends a response to a synchronous message.
    pub fn add_sync_response(&mut self, content_type: Option<&str>, contents: &str) -> Result<&mut Self, Error> {
        if self.interaction.kind() != InteractionKind::SyncMessage {
            return Err(Error::invalid_state(format!(
                "'{}' is not a synchronous message",
                self.interaction.description()
            )));
        }
        if let Interaction::SyncMessage(message) = &mut *self.interaction {
            message.response.push(MessageContents::default());
        }
        self.with_body(InteractionPart::Response, content_type, contents)
    }

    pub fn set_key<S: Into<String>>(&mut self, key: Option<S>) -> &mut Self {
        self.interaction.set_key(key.map(Into::into));
        self
    }

    pub fn set_pending(&mut self, pending: bool) -> &mut Self {
        self.interaction.set_pending(pending);
        self
    }

    /// Sets a free-form comment; `None` removes it.
    pub fn set_comment(&mut self, key: &str, value: Option<Value>) -> &mut Self {
        let comments = self.interaction.comments_mut();
        match value {
            Some(value) => {
                comments.other.insert(key.to_string(), value);
            }
            None => {
                comments.other.remove(key);
            }
        }
        self
    }

    pub fn add_text_comment<S: Into<String>>(&mut self, text: S) -> &mut Self {
        self.interaction.comments_mut().text.push(text.into());
        self
    }

    pub fn test_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.interaction.comments_mut().test_name = Some(name.into());
        self
    }

    /// Merges rules given in the V3 JSON form.
    pub fn with_matching_rules(&mut self, part: InteractionPart, rules: &str) -> Result<&mut Self, Error> {
        let json: Value = serde_json::from_str(rules)?;
        let rules = MatchingRules::from_v3_json(&json)?;
        self.part(part)?.rules().merge(&rules);
        Ok(self)
    }

    /// Merges generators given in the JSON form of a pact file.
    pub fn with_generators(&mut self, part: InteractionPart, generators: &str) -> Result<&mut Self, Error> {
        let json: Value = serde_json::from_str(generators)?;
        let generators = Generators::from_json(&json)?;
        self.part(part)?.generators().merge(&generators);
        Ok(self)
    }

    /// Adds a rule list directly, mostly useful for tests.
    pub fn with_rule(
        &mut self,
        part: InteractionPart,
        category: Category,
        path: DocPath,
        rule: MatchingRule,
    ) -> Result<&mut Self, Error> {
        self.part(part)?
            .rules()
            .add_category(category)
            .add_rule(path, rule, RuleLogic::And);
        Ok(self)
    }

    fn part(&mut self, part: InteractionPart) -> Result<PartMut<'_>, Error> {
        let description = self.interaction.description().to_string();
        match (&mut *self.interaction, part) {
            (Interaction::Http(http), InteractionPart::Request) => Ok(PartMut::Request(&mut http.request)),
            (Interaction::Http(http), InteractionPart::Response) => Ok(PartMut::Response(&mut http.response)),
            (Interaction::AsyncMessage(message), InteractionPart::Request) => {
                Ok(PartMut::Message(&mut message.contents))
            }
            (Interaction::AsyncMessage(_), InteractionPart::Response) => Err(Error::invalid_state(format!(
                "Asynchronous message '{}' has no response",
                description
            ))),
            (Interaction::SyncMessage(message), InteractionPart::Request) => {
                Ok(PartMut::Message(&mut message.request))
            }
            (Interaction::SyncMessage(message), InteractionPart::Response) => {
                if message.response.is_empty() {
                    message.response.push(MessageContents::default());
                }
                let last = message.response.len() - 1;
                Ok(PartMut::Message(&mut message.response[last]))
            }
        }
    }

    fn require_http(&self, operation: &str) -> Result<(), Error> {
        if self.interaction.kind() == InteractionKind::Http {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "{} needs an HTTP interaction, '{}' is a {}",
                operation,
                self.interaction.description(),
                self.interaction.kind()
            )))
        }
    }

    /// Specification of the pact the interaction belongs to.
    pub fn specification(&self) -> PactSpecification {
        self.specification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::http::HttpPart;
    use serde_json::json;

    #[test]
    fn builds_http_interactions() {
        let mut pact = Pact::new("consumer", "provider", PactSpecification::V3);
        let handle = pact.upon_receiving("get alligator").unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .given("there is an alligator named Mary")
            .with_request("get", "/alligators/Mary")
            .unwrap()
            .with_header(InteractionPart::Request, "Accept", "application/json")
            .unwrap()
            .will_respond_with(200)
            .unwrap()
            .with_body(InteractionPart::Response, Some("application/json"), r#"{ "name": "Mary" }"#)
            .unwrap();

        let interaction = pact.interaction(handle).unwrap().as_http().unwrap();
        assert_eq!(interaction.request.method, "GET");
        assert_eq!(interaction.response.body.value(), Some(&b"{\"name\":\"Mary\"}"[..]));
        assert_eq!(
            interaction.response.lookup_header("content-type").unwrap(),
            &vec!["application/json".to_string()]
        );
        assert_eq!(interaction.provider_states.len(), 1);
    }

    #[test]
    fn locked_pacts_reject_changes() {
        let mut pact = Pact::new("c", "p", PactSpecification::V3);
        let handle = pact.upon_receiving("a").unwrap();
        pact.lock();
        assert!(matches!(pact.interaction_mut(handle), Err(Error::InvalidState(_))));
        assert!(matches!(pact.upon_receiving("b"), Err(Error::InvalidState(_))));
        assert!(matches!(
            pact.with_metadata("ns", "k", json!(1)),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn v3_descriptions_are_unique() {
        let mut pact = Pact::new("c", "p", PactSpecification::V3);
        let first = pact.upon_receiving("same").unwrap();
        pact.interaction_mut(first).unwrap().given("state one");
        let second = pact.upon_receiving("same").unwrap();
        pact.interaction_mut(second).unwrap().given("state two").given("state one");
        assert_eq!(first, second);
        assert_eq!(pact.interactions.len(), 1);
        assert_eq!(pact.interactions[0].provider_states().len(), 2);

        let mut v2 = Pact::new("c", "p", PactSpecification::V2);
        v2.upon_receiving("same").unwrap();
        v2.upon_receiving("same").unwrap();
        assert_eq!(v2.interactions.len(), 2);
    }

    #[test]
    fn message_builders() {
        let mut pact = Pact::new("c", "p", PactSpecification::V3);
        let handle = pact.add_interaction("an event", InteractionKind::AsyncMessage).unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .with_message_contents(Some("application/json"), r#"{"id": {"pact:matcher:type": "integer", "value": 7}}"#)
            .unwrap()
            .with_metadata(InteractionPart::Request, "topic", json!("alligators"))
            .unwrap();

        match pact.interaction(handle).unwrap() {
            Interaction::AsyncMessage(message) => {
                assert_eq!(message.contents.contents.as_json(), Some(json!({"id": 7})));
                assert_eq!(message.contents.metadata["topic"], json!("alligators"));
                assert_eq!(message.contents.metadata["contentType"], json!("application/json"));
                assert!(message.contents.matching_rules.category(Category::Body).is_some());
            }
            other => panic!("unexpected interaction {:?}", other),
        }

        assert!(pact
            .interaction_mut(handle)
            .unwrap()
            .will_respond_with(200)
            .is_err());
    }

    #[test]
    fn sync_messages_collect_responses() {
        let mut pact = Pact::new("c", "p", PactSpecification::V3);
        let handle = pact.add_interaction("a request", InteractionKind::SyncMessage).unwrap();
        assert_eq!(pact.specification, PactSpecification::V4);
        {
            let mut builder = pact.interaction_mut(handle).unwrap();
            builder.with_message_contents(Some("text/plain"), "ping").unwrap();
            builder.add_sync_response(Some("text/plain"), "pong").unwrap();
            builder.add_sync_response(Some("text/plain"), "pong again").unwrap();
        }
        match pact.interaction(handle).unwrap() {
            Interaction::SyncMessage(message) => {
                assert_eq!(message.request.contents.value(), Some(&b"ping"[..]));
                assert_eq!(message.response.len(), 2);
            }
            other => panic!("unexpected interaction {:?}", other),
        }
    }

    #[test]
    fn multipart_bodies_carry_their_boundary() {
        let mut pact = Pact::new("c", "p", PactSpecification::V3);
        let handle = pact.upon_receiving("upload").unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .with_request("POST", "/upload")
            .unwrap()
            .with_multipart_file(InteractionPart::Request, "image/png", "file", "a.png", &[0x89, b'P', b'N', b'G'])
            .unwrap();

        let request = &pact.interaction(handle).unwrap().as_http().unwrap().request;
        let content_type = request.content_type().unwrap();
        assert!(content_type.is_multipart());
        let boundary = content_type.boundary().unwrap().to_string();
        assert!(request.body.value_as_string().unwrap().contains(&boundary));
    }

    #[test]
    fn comments_and_v4_attributes() {
        let mut pact = Pact::new("c", "p", PactSpecification::V4);
        let handle = pact.upon_receiving("a").unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .set_key(Some("k1"))
            .set_pending(true)
            .add_text_comment("note")
            .test_name("tests::a")
            .set_comment("ticket", Some(json!("X-1")));
        let interaction = pact.interaction(handle).unwrap();
        assert_eq!(interaction.key(), Some("k1"));
        assert!(interaction.pending());
        assert_eq!(interaction.comments().text, vec!["note".to_string()]);
        assert_eq!(interaction.comments().test_name.as_deref(), Some("tests::a"));
    }

    fn alligator_events() -> Pact {
        let mut pact = Pact::new("Alligator Consumer", "Alligator Events", PactSpecification::V3);
        for (description, name) in [("Mary was created", "Mary"), ("Tom was created", "Tom")] {
            let handle = pact.add_interaction(description, InteractionKind::AsyncMessage).unwrap();
            pact.interaction_mut(handle)
                .unwrap()
                .with_message_contents(
                    Some("application/json"),
                    &json!({
                        "name": name,
                        "id": {"pact:matcher:type": "integer", "value": 7, "pact:generator:type": "RandomInt", "min": 100, "max": 200}
                    })
                    .to_string(),
                )
                .unwrap()
                .with_metadata(InteractionPart::Request, "topic", json!("alligators"))
                .unwrap();
        }
        pact
    }

    #[test]
    fn message_handlers_see_generated_contents_and_metadata() {
        let pact = alligator_events();
        let mut seen = Vec::new();
        let failures = pact
            .verify_messages(InteractionKind::AsyncMessage, |contents, metadata| {
                let body = contents.as_json().unwrap();
                assert_eq!(metadata["topic"], "alligators");
                let id = body["id"].as_i64().unwrap();
                assert!((100..=200).contains(&id), "id {} was not generated", id);
                seen.push(body["name"].as_str().unwrap().to_string());
                Ok::<(), String>(())
            })
            .unwrap();
        assert!(failures.is_empty());
        assert_eq!(seen, vec!["Mary", "Tom"]);
    }

    #[test]
    fn message_handler_failures_are_reported_per_message() {
        let pact = alligator_events();
        let failures = pact
            .verify_messages(InteractionKind::AsyncMessage, |contents, _| {
                match contents.as_json().unwrap()["name"].as_str() {
                    Some("Mary") => Ok(()),
                    Some("Tom") => panic!("Tom is not an alligator we know"),
                    _ => Err("no name"),
                }
            })
            .unwrap();
        assert_eq!(
            failures,
            vec![MessageHandlingFailure {
                description: "Tom was created".into(),
                message: "Tom is not an alligator we know".into(),
            }]
        );

        let failures = pact
            .verify_messages(InteractionKind::AsyncMessage, |_, _| Err("queue unavailable"))
            .unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].message, "queue unavailable");
    }

    #[test]
    fn only_message_kinds_can_be_handled() {
        let pact = alligator_events();
        assert!(matches!(
            pact.verify_messages(InteractionKind::Http, |_, _| Ok::<(), String>(())),
            Err(Error::Configuration(_))
        ));
        let failures = pact
            .verify_messages(InteractionKind::SyncMessage, |_, _| Err("never called"))
            .unwrap();
        assert!(failures.is_empty());
    }
}
