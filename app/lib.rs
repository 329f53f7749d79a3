/*!
The verdict inference app: a hyper service exposing `GET /ping` and `POST /infer` over a model server constructed once at startup.
*/

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use verdict_core::model::{Model, ModelServer};
use verdict_core::schema::Schema;
use verdict_deps::{
	hyper::{Body, Method, Request, Response, StatusCode},
	tokio, tracing,
};
use verdict_util::{err, error::Result};

mod api;
mod error;

pub struct Options {
	pub host: std::net::IpAddr,
	pub port: u16,
	pub schema: PathBuf,
	pub model: PathBuf,
}

pub struct Context {
	pub(crate) model_server: ModelServer,
}

async fn handle(context: Arc<Context>, request: Request<Body>) -> Response<Body> {
	let method = request.method().clone();
	let uri = request.uri().clone();
	let path = uri.path_and_query().unwrap().path().to_owned();
	let path_components: Vec<_> = path.split('/').skip(1).collect();
	let result = match (&method, path_components.as_slice()) {
		(&Method::GET, &["ping"]) => self::api::ping::get(&context, request).await,
		(&Method::POST, &["infer"]) => self::api::infer::post(&context, request).await,
		_ => Ok(Response::builder()
			.status(StatusCode::NOT_FOUND)
			.body(Body::from("not found"))
			.unwrap()),
	};
	let response = match result {
		Ok(response) => response,
		Err(error) => {
			tracing::error!("request failed: {}", error);
			let message: Cow<str> = if cfg!(debug_assertions) {
				error.to_string().into()
			} else {
				"internal server error".into()
			};
			error::failure_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
		}
	};
	tracing::info!("{} {} {}", method, path, response.status().as_u16());
	response
}

pub fn run(options: Options) -> Result<()> {
	let mut runtime = tokio::runtime::Builder::new()
		.threaded_scheduler()
		.enable_all()
		.build()?;
	runtime.block_on(run_impl(options))
}

async fn run_impl(options: Options) -> Result<()> {
	let schema = Schema::from_path(&options.schema)?;
	let model = Model::from_path(&options.model)?;
	if model.task() != schema.task() {
		return Err(err!(
			"the model artifact does not match the schema's problem category"
		));
	}
	let model_server = ModelServer::new(schema, Box::new(model));
	let context = Context { model_server };
	verdict_util::serve::serve(options.host, options.port, context, handle).await?;
	Ok(())
}

#[cfg(test)]
use verdict_deps::serde_json;

#[cfg(test)]
fn test_context() -> Arc<Context> {
	let schema = Schema::from_value(serde_json::json!({
		"title": "titanic",
		"description": "passenger survival",
		"problemCategory": "binary_classification",
		"version": 1.0,
		"inputDataFormat": "CSV",
		"id": {
			"name": "PassengerId",
			"description": "unique identifier."
		},
		"target": {
			"name": "Survived",
			"description": "A binary variable indicating whether or not the passenger survived (0 = No, 1 = Yes).",
			"allowedValues": ["0", "1"],
			"positiveClass": "1"
		},
		"predictors": [
			{ "name": "Pclass", "description": "passenger class", "dataType": "INT" },
			{ "name": "Sex", "description": "sex", "dataType": "CATEGORICAL", "allowedValues": ["male", "female"] },
			{ "name": "Age", "description": "age in years", "dataType": "NUMERIC" },
			{ "name": "Fare", "description": "ticket fare", "dataType": "REAL" },
			{ "name": "Embarked", "description": "port of embarkation", "dataType": "CATEGORICAL", "allowedValues": ["C", "Q", "S"] }
		]
	}))
	.unwrap();
	let model = Model::Classifier(verdict_core::model::Classifier {
		classes: vec!["0".to_owned(), "1".to_owned()],
		priors: vec![0.97548, 0.02452],
	});
	Arc::new(Context {
		model_server: ModelServer::new(schema, Box::new(model)),
	})
}

#[cfg(test)]
fn test_request_body() -> serde_json::Value {
	serde_json::json!({
		"instances": [
			{
				"PassengerId": "879",
				"Pclass": 3,
				"Sex": "male",
				"Age": null,
				"Fare": 7.8958,
				"Embarked": "S"
			}
		]
	})
}

#[cfg(test)]
fn block_on<F: std::future::Future>(future: F) -> F::Output {
	let mut runtime = tokio::runtime::Runtime::new().unwrap();
	runtime.block_on(future)
}

#[cfg(test)]
async fn response_json(response: Response<Body>) -> serde_json::Value {
	let data = verdict_deps::hyper::body::to_bytes(response.into_body())
		.await
		.unwrap();
	serde_json::from_slice(&data).unwrap()
}

#[cfg(test)]
fn infer_request(body: &serde_json::Value) -> Request<Body> {
	Request::builder()
		.method(Method::POST)
		.uri("/infer")
		.body(Body::from(serde_json::to_vec(body).unwrap()))
		.unwrap()
}

#[test]
fn test_ping() {
	block_on(async {
		let request = Request::builder()
			.method(Method::GET)
			.uri("/ping")
			.body(Body::empty())
			.unwrap();
		let response = handle(test_context(), request).await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			response_json(response).await,
			serde_json::json!({ "message": "Pong!" })
		);
	});
}

#[test]
fn test_unknown_route() {
	block_on(async {
		let request = Request::builder()
			.method(Method::GET)
			.uri("/nope")
			.body(Body::empty())
			.unwrap();
		let response = handle(test_context(), request).await;
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	});
}

#[test]
fn test_infer() {
	block_on(async {
		let response = handle(test_context(), infer_request(&test_request_body())).await;
		assert_eq!(response.status(), StatusCode::OK);
		let value = response_json(response).await;
		assert_eq!(value["status"], "success");
		assert_eq!(value["message"], "");
		assert_eq!(value["targetClasses"], serde_json::json!(["0", "1"]));
		assert_eq!(
			value["targetDescription"],
			"A binary variable indicating whether or not the passenger survived (0 = No, 1 = Yes).",
		);
		assert_eq!(
			value["predictions"],
			serde_json::json!([
				{
					"sampleId": "879",
					"predictedClass": "0",
					"predictedProbabilities": [0.97548, 0.02452]
				}
			])
		);
		assert_eq!(value["requestId"].as_str().unwrap().len(), 32);
		let timestamp = value["timestamp"].as_str().unwrap();
		assert!(timestamp.contains('T') && timestamp.ends_with('Z'));
	});
}

#[test]
fn test_infer_request_ids_differ() {
	block_on(async {
		let context = test_context();
		let a = response_json(handle(context.clone(), infer_request(&test_request_body())).await).await;
		let b = response_json(handle(context, infer_request(&test_request_body())).await).await;
		assert_ne!(a["requestId"], b["requestId"]);
		assert_eq!(a["predictions"], b["predictions"]);
	});
}

#[test]
fn test_infer_empty_instances() {
	block_on(async {
		let body = serde_json::json!({ "instances": [] });
		let response = handle(test_context(), infer_request(&body)).await;
		assert_eq!(response.status(), StatusCode::OK);
		let value = response_json(response).await;
		assert_eq!(value["status"], "success");
		assert_eq!(value["predictions"], serde_json::json!([]));
	});
}

#[test]
fn test_infer_undecodable_body() {
	block_on(async {
		let request = Request::builder()
			.method(Method::POST)
			.uri("/infer")
			.body(Body::from("not json"))
			.unwrap();
		let response = handle(test_context(), request).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let value = response_json(response).await;
		assert_eq!(value["status"], "failure");
		assert!(value["message"]
			.as_str()
			.unwrap()
			.starts_with("failed to decode the request body"));
	});
}

#[test]
fn test_infer_missing_feature() {
	block_on(async {
		let mut body = test_request_body();
		body["instances"][0].as_object_mut().unwrap().remove("Age");
		let response = handle(test_context(), infer_request(&body)).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let value = response_json(response).await;
		assert_eq!(value["status"], "failure");
		assert_eq!(
			value["message"],
			"feature \"Age\" is not present in instance 0"
		);
	});
}
