use verdict_core::predict::ErrorResponse;
use verdict_deps::{
	hyper::{header, Body, Response, StatusCode},
	serde_json,
};

/// Build a failure envelope response. The envelope carries its own request id and timestamp, mirroring the success path.
pub(crate) fn failure_response(status: StatusCode, message: &str) -> Response<Body> {
	let body = serde_json::to_vec(&ErrorResponse::new(message.to_owned())).unwrap();
	Response::builder()
		.status(status)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body))
		.unwrap()
}
