use crate::error::failure_response;
use crate::Context;
use verdict_core::predict::PredictInput;
use verdict_core::validate::InvalidInstance;
use verdict_deps::{
	hyper::{self, header, Body, Request, Response, StatusCode},
	serde_json, tracing,
};
use verdict_util::error::Result;

#[derive(Debug, serde::Deserialize)]
struct InferenceRequest {
	instances: PredictInput,
}

pub(crate) async fn post(context: &Context, mut request: Request<Body>) -> Result<Response<Body>> {
	let data = match hyper::body::to_bytes(request.body_mut()).await {
		Ok(data) => data,
		Err(_) => {
			return Ok(failure_response(
				StatusCode::BAD_REQUEST,
				"failed to read the request body",
			))
		}
	};
	let request_body: InferenceRequest = match serde_json::from_slice(&data) {
		Ok(request_body) => request_body,
		Err(error) => {
			return Ok(failure_response(
				StatusCode::BAD_REQUEST,
				&format!("failed to decode the request body: {}", error),
			))
		}
	};
	tracing::info!("invoked with {} instances", request_body.instances.len());
	let response = match context.model_server.predict(&request_body.instances) {
		Ok(response) => response,
		Err(error) => {
			if error.downcast_ref::<InvalidInstance>().is_some() {
				tracing::error!("invalid inference request: {}", error);
				return Ok(failure_response(StatusCode::BAD_REQUEST, &error.to_string()));
			}
			return Err(error);
		}
	};
	let body = serde_json::to_vec(&response)?;
	Ok(Response::builder()
		.status(StatusCode::OK)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body))?)
}
