use crate::Context;
use verdict_deps::{
	hyper::{header, Body, Request, Response, StatusCode},
	serde_json,
};
use verdict_util::error::Result;

pub(crate) async fn get(_context: &Context, _request: Request<Body>) -> Result<Response<Body>> {
	let body = serde_json::to_vec(&serde_json::json!({ "message": "Pong!" }))?;
	Ok(Response::builder()
		.status(StatusCode::OK)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body))?)
}
