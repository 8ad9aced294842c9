use crate::error::Error;
use crate::models::{
    http::{parse_query_string, Headers, HttpPart},
    ContentType, HttpRequest, HttpResponse, OptionalBody,
};
use hyper::{
    body,
    header::{HeaderName, HeaderValue},
    Body, HeaderMap, Request, Response,
};

/// Groups the values of a header map by name, in first-seen order per name.
pub fn extract_headers(header_map: &HeaderMap) -> Headers {
    // values with opaque characters are skipped
    let mut headers = Headers::new();
    for (key, value) in header_map.iter() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(String::from(key.as_str()))
                .or_default()
                .push(String::from(value));
        }
    }
    headers
}

pub fn put_headers(header_map: &mut HeaderMap<HeaderValue>, headers: &Headers) -> Result<(), Error> {
    for (key, values) in headers {
        let header_name = HeaderName::from_lowercase(key.to_lowercase().as_bytes())?;
        for value in values {
            let header_value = HeaderValue::from_str(value)?;
            header_map.append(header_name.clone(), header_value);
        }
    }

    Ok(())
}

fn header_content_type(headers: &Headers) -> Option<ContentType> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, values)| values.first())
        .and_then(|value| value.parse().ok())
}

fn to_body(bytes: &[u8], headers: &Headers) -> OptionalBody {
    if bytes.is_empty() {
        OptionalBody::Empty
    } else {
        OptionalBody::Present(bytes.to_vec(), header_content_type(headers))
    }
}

fn some_if_not_empty(headers: Headers) -> Option<Headers> {
    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}

/// Reads an incoming hyper request into the model form.
pub async fn read_request(request: Request<Body>) -> Result<HttpRequest, Error> {
    let (parts, request_body) = request.into_parts();
    let headers = extract_headers(&parts.headers);

    let bytes = body::to_bytes(request_body)
        .await
        .map_err(|_| Error::InvalidBody)?;

    Ok(HttpRequest {
        method: parts.method.to_string().to_uppercase(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().and_then(parse_query_string),
        body: to_body(&bytes, &headers),
        headers: some_if_not_empty(headers),
        ..HttpRequest::default()
    })
}

/// Reads a provider response into the model form.
pub async fn read_response(response: Response<Body>) -> Result<HttpResponse, Error> {
    let (parts, response_body) = response.into_parts();
    let headers = extract_headers(&parts.headers);
    let bytes = body::to_bytes(response_body).await?;

    Ok(HttpResponse {
        status: parts.status.as_u16(),
        body: to_body(&bytes, &headers),
        headers: some_if_not_empty(headers),
        ..HttpResponse::default()
    })
}

/// Builds the hyper response for a model response. A body without a
/// declared content type gets the type detected from its contents.
pub fn build_response(response: &HttpResponse) -> Result<Response<Body>, Error> {
    let mut response_builder = Response::builder().status(response.status);
    let headers_mut = response_builder.headers_mut().ok_or(Error::InvalidStatusCode)?;
    if let Some(headers) = &response.headers {
        put_headers(headers_mut, headers)?;
    }
    if !response.has_header("content-type") {
        if let Some(content_type) = response.body.resolved_content_type() {
            headers_mut.insert(
                hyper::header::CONTENT_TYPE,
                HeaderValue::from_str(&content_type.to_string())?,
            );
        }
    }

    Ok(response_builder.body(response.body.bytes().into())?)
}

/// Builds the hyper request sending `request` to `base_url`.
pub fn build_request(base_url: &str, request: &HttpRequest) -> Result<Request<Body>, Error> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), request.path_and_query());
    let mut request_builder = Request::builder()
        .uri(url.as_str())
        .method(request.method.as_str());

    if let Some(headers_mut) = request_builder.headers_mut() {
        if let Some(headers) = &request.headers {
            let headers = headers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
                .map(|(name, values)| (name.clone(), values.clone()))
                .collect();
            put_headers(headers_mut, &headers)?;
        }
    }

    Ok(request_builder.body(request.body.bytes().into())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_keep_repeated_values() {
        let mut map = HeaderMap::new();
        map.append("accept", HeaderValue::from_static("text/html"));
        map.append("accept", HeaderValue::from_static("application/json"));
        map.insert("x-id", HeaderValue::from_static("1"));

        let headers = extract_headers(&map);
        assert_eq!(headers["accept"], vec!["text/html".to_string(), "application/json".to_string()]);

        let mut copy = HeaderMap::new();
        put_headers(&mut copy, &headers).unwrap();
        assert_eq!(copy.get_all("accept").iter().count(), 2);
    }

    #[test]
    fn invalid_header_names_are_errors() {
        let mut headers = Headers::new();
        headers.insert("bad header".into(), vec!["x".into()]);
        assert!(matches!(
            put_headers(&mut HeaderMap::new(), &headers),
            Err(Error::InvalidHeaderName)
        ));
    }

    #[tokio::test]
    async fn requests_are_read_into_the_model() {
        let request = Request::builder()
            .method("post")
            .uri("/alligators?name=Mary&name=Tom")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"name":"Mary"}"#))
            .unwrap();

        let request = read_request(request).await.unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/alligators");
        assert_eq!(request.query.unwrap()["name"], vec!["Mary".to_string(), "Tom".to_string()]);
        assert_eq!(request.body.content_type().map(|c| c.is_json()), Some(true));
    }

    #[test]
    fn requests_are_built_against_a_base_url() {
        let mut request = HttpRequest {
            method: "GET".into(),
            path: "/alligators/Mary".into(),
            ..HttpRequest::default()
        };
        request.add_header("Accept", "application/json");
        request.add_header("Host", "example.com");

        let built = build_request("http://127.0.0.1:8080/", &request).unwrap();
        assert_eq!(built.uri().to_string(), "http://127.0.0.1:8080/alligators/Mary");
        assert!(built.headers().get("host").is_none());
        assert_eq!(built.headers()["accept"], "application/json");
    }
}
