#[cfg(test)]
mod consumer;
#[cfg(test)]
mod provider;

/// Pacts shared by the consumer and provider tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use pact_engine::{InteractionPart, Pact, PactSpecification};

    pub const CONSUMER: &str = "Alligator Web";
    pub const PROVIDER: &str = "Alligator Service";

    pub fn alligator_pact() -> Pact {
        let mut pact = Pact::new(CONSUMER, PROVIDER, PactSpecification::V3);
        let handle = pact.upon_receiving("a request for an alligator").unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .given("there is an alligator named Mary")
            .with_request("GET", "/alligators/Mary")
            .unwrap()
            .with_header(InteractionPart::Request, "Accept", "application/json")
            .unwrap()
            .will_respond_with(200)
            .unwrap()
            .with_header(InteractionPart::Response, "Content-Type", "application/json")
            .unwrap()
            .with_body(InteractionPart::Response, Some("application/json"), r#"{"name":"Mary"}"#)
            .unwrap();
        pact
    }

    /// A provider double answering `method path` with `status` and `body`.
    pub fn provider_pact(method: &str, path: &str, status: u16, body: &str) -> Pact {
        let mut pact = Pact::new("Verifier", PROVIDER, PactSpecification::V3);
        let handle = pact.upon_receiving(format!("{} {}", method, path)).unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .with_request(method, path)
            .unwrap()
            .will_respond_with(status)
            .unwrap()
            .with_header(InteractionPart::Response, "Content-Type", "application/json")
            .unwrap()
            .with_body(InteractionPart::Response, Some("application/json"), body)
            .unwrap();
        pact
    }
}
