use crate::schema::{Schema, Task};
use chrono::prelude::*;
use std::borrow::Cow;
use std::collections::BTreeMap;
use verdict_util::{err, error::Result, id::Id};

/// The instances of an inference request, one json record per sample.
pub type PredictInput = Vec<serde_json::Map<String, serde_json::Value>>;

/// A sample identifier, carried through to the response with its json type preserved.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
	Number(serde_json::Number),
	String(String),
}

impl NumberOrString {
	pub fn as_string(&self) -> Cow<str> {
		match self {
			NumberOrString::Number(number) => number.to_string().into(),
			NumberOrString::String(string) => string.into(),
		}
	}
}

/// One prediction table row for a classification task: the sample id and the probability the model assigned to each of its class labels.
#[derive(Debug, Clone)]
pub struct ClassificationRow {
	pub sample_id: NumberOrString,
	pub probabilities: BTreeMap<String, f64>,
}

/// One prediction table row for a regression task.
#[derive(Debug, Clone)]
pub struct RegressionRow {
	pub sample_id: NumberOrString,
	pub prediction: f64,
}

/// The prediction table handed to the response builder. The variant is the explicit task mode: the builder never infers the mode from the shape of the data.
#[derive(Debug, Clone)]
pub enum PredictionRows {
	Classification(Vec<ClassificationRow>),
	Regression(Vec<RegressionRow>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
	Success,
	Failure,
}

/// The response envelope for a successful inference call.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResponse {
	pub status: ResponseStatus,
	pub message: String,
	pub timestamp: String,
	pub request_id: Id,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target_classes: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target_description: Option<String>,
	pub predictions: Vec<SamplePrediction>,
}

#[derive(Debug, serde::Serialize)]
#[serde(untagged)]
pub enum SamplePrediction {
	Classification(ClassificationPrediction),
	Regression(RegressionPrediction),
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationPrediction {
	pub sample_id: NumberOrString,
	pub predicted_class: String,
	pub predicted_probabilities: Vec<f64>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionPrediction {
	pub sample_id: NumberOrString,
	pub prediction: f64,
}

/// The envelope returned in place of `InferenceResponse` when a request fails.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
	pub status: ResponseStatus,
	pub message: String,
	pub timestamp: String,
	pub request_id: Id,
}

impl ErrorResponse {
	pub fn new(message: String) -> Self {
		Self {
			status: ResponseStatus::Failure,
			message,
			timestamp: format_timestamp(Utc::now()),
			request_id: Id::new(),
		}
	}
}

pub fn format_timestamp(date: DateTime<Utc>) -> String {
	date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Build the response envelope for a prediction table.
///
/// The predicted class of each row is the class with the maximal probability; an exact tie goes to the class declared first in the schema. Probability vectors follow schema-declared class order and each value is rounded to 5 decimal places, half away from zero. Row order is preserved. A fresh request id and a UTC timestamp are stamped on every call.
pub fn build_response(schema: &Schema, rows: PredictionRows) -> Result<InferenceResponse> {
	build_response_with(schema, rows, Id::new(), format_timestamp(Utc::now()))
}

fn build_response_with(
	schema: &Schema,
	rows: PredictionRows,
	request_id: Id,
	timestamp: String,
) -> Result<InferenceResponse> {
	match (schema.task(), rows) {
		(Task::Classification, PredictionRows::Classification(rows)) => {
			let classes = schema
				.target_classes()
				.ok_or_else(|| err!("the schema declares no target classes"))?;
			let predictions = rows
				.into_iter()
				.map(|row| classification_prediction(classes, row))
				.collect::<Result<Vec<_>>>()?;
			Ok(InferenceResponse {
				status: ResponseStatus::Success,
				message: String::new(),
				timestamp,
				request_id,
				target_classes: Some(classes.to_vec()),
				target_description: Some(schema.target_description().to_owned()),
				predictions,
			})
		}
		(Task::Regression, PredictionRows::Regression(rows)) => {
			let predictions = rows
				.into_iter()
				.map(|row| {
					SamplePrediction::Regression(RegressionPrediction {
						sample_id: row.sample_id,
						prediction: row.prediction,
					})
				})
				.collect();
			Ok(InferenceResponse {
				status: ResponseStatus::Success,
				message: String::new(),
				timestamp,
				request_id,
				target_classes: None,
				target_description: None,
				predictions,
			})
		}
		_ => Err(err!(
			"the prediction rows do not match the schema's problem category"
		)),
	}
}

fn classification_prediction(
	classes: &[String],
	row: ClassificationRow,
) -> Result<SamplePrediction> {
	let mut predicted_class: Option<&str> = None;
	let mut max_probability = std::f64::NEG_INFINITY;
	let mut predicted_probabilities = Vec::with_capacity(classes.len());
	for class in classes {
		let probability = *row.probabilities.get(class).ok_or_else(|| {
			err!(
				"class \"{}\" is missing from the prediction row for sample \"{}\"",
				class,
				row.sample_id.as_string()
			)
		})?;
		// Strictly greater, so an exact tie keeps the first schema-declared class.
		if probability > max_probability {
			max_probability = probability;
			predicted_class = Some(class.as_str());
		}
		predicted_probabilities.push(round_probability(probability));
	}
	let predicted_class = predicted_class
		.ok_or_else(|| err!("the schema declares no target classes"))?
		.to_owned();
	Ok(SamplePrediction::Classification(ClassificationPrediction {
		sample_id: row.sample_id,
		predicted_class,
		predicted_probabilities,
	}))
}

// Half away from zero, 5 decimal places.
fn round_probability(value: f64) -> f64 {
	(value * 1e5).round() / 1e5
}

#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn test_rows(rows: &[(&str, &[(&str, f64)])]) -> PredictionRows {
	PredictionRows::Classification(
		rows.iter()
			.map(|(sample_id, probabilities)| ClassificationRow {
				sample_id: NumberOrString::String(sample_id.to_string()),
				probabilities: probabilities
					.iter()
					.map(|(class, probability)| (class.to_string(), *probability))
					.collect(),
			})
			.collect(),
	)
}

#[test]
fn test_classification_envelope() {
	let schema = crate::schema::test_schema();
	let rows = test_rows(&[
		("879", &[("0", 0.97548), ("1", 0.02452)]),
		("880", &[("0", 0.4), ("1", 0.6)]),
	]);
	let request_id = "f51a3a61ee9d4731b1b06c816a8ab856".parse().unwrap();
	let timestamp = "2023-04-29T18:30:00Z".to_owned();
	let response = build_response_with(&schema, rows, request_id, timestamp).unwrap();
	insta::assert_json_snapshot!(response, @r###"
 {
   "status": "success",
   "message": "",
   "timestamp": "2023-04-29T18:30:00Z",
   "requestId": "f51a3a61ee9d4731b1b06c816a8ab856",
   "targetClasses": [
     "0",
     "1"
   ],
   "targetDescription": "some target desc.",
   "predictions": [
     {
       "sampleId": "879",
       "predictedClass": "0",
       "predictedProbabilities": [
         0.97548,
         0.02452
       ]
     },
     {
       "sampleId": "880",
       "predictedClass": "1",
       "predictedProbabilities": [
         0.4,
         0.6
       ]
     }
   ]
 }
 "###);
}

#[test]
fn test_order_and_count_preserved() {
	let schema = crate::schema::test_schema();
	let ids = ["c", "a", "b", "a"];
	let probabilities: &[(&str, f64)] = &[("0", 0.6), ("1", 0.4)];
	let rows = test_rows(
		&ids.iter()
			.map(|id| (*id, probabilities))
			.collect::<Vec<_>>(),
	);
	let response = build_response(&schema, rows).unwrap();
	assert_eq!(response.predictions.len(), ids.len());
	let response_ids: Vec<String> = response
		.predictions
		.iter()
		.map(|prediction| match prediction {
			SamplePrediction::Classification(prediction) => {
				prediction.sample_id.as_string().into_owned()
			}
			SamplePrediction::Regression(_) => unreachable!(),
		})
		.collect();
	let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
	assert_eq!(response_ids, ids);
}

#[test]
fn test_predicted_class_is_argmax() {
	let schema = crate::schema::test_schema();
	let rows = test_rows(&[("1", &[("0", 0.6), ("1", 0.4)])]);
	let response = build_response(&schema, rows).unwrap();
	match &response.predictions[0] {
		SamplePrediction::Classification(prediction) => {
			assert_eq!(prediction.predicted_class, "0");
		}
		SamplePrediction::Regression(_) => unreachable!(),
	}
}

#[test]
fn test_tie_goes_to_first_declared_class() {
	let schema = crate::schema::test_schema();
	let rows = test_rows(&[("1", &[("0", 0.5), ("1", 0.5)])]);
	let response = build_response(&schema, rows).unwrap();
	match &response.predictions[0] {
		SamplePrediction::Classification(prediction) => {
			assert_eq!(prediction.predicted_class, "0");
		}
		SamplePrediction::Regression(_) => unreachable!(),
	}
}

#[test]
fn test_rounding_keeps_rows_normalized() {
	let schema = crate::schema::test_schema();
	let third = 1.0 / 3.0;
	let rows = test_rows(&[("1", &[("0", third * 2.0), ("1", third)])]);
	let response = build_response(&schema, rows).unwrap();
	match &response.predictions[0] {
		SamplePrediction::Classification(prediction) => {
			let probabilities = &prediction.predicted_probabilities;
			assert!((probabilities[0] - third * 2.0).abs() < 5e-6);
			assert!((probabilities[1] - third).abs() < 5e-6);
			assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-5);
		}
		SamplePrediction::Regression(_) => unreachable!(),
	}
}

#[test]
fn test_exact_sample_prediction() {
	let schema = crate::schema::test_schema();
	let rows = test_rows(&[("879", &[("0", 1.0), ("1", 0.0)])]);
	let response = build_response(&schema, rows).unwrap();
	let value = serde_json::to_value(&response.predictions[0]).unwrap();
	assert_eq!(
		value,
		serde_json::json!({
			"sampleId": "879",
			"predictedClass": "0",
			"predictedProbabilities": [1.0, 0.0]
		})
	);
}

#[test]
fn test_regression_envelope() {
	let schema = crate::schema::Schema::from_value(serde_json::json!({
		"title": "test dataset",
		"problemCategory": "regression",
		"version": 1.0,
		"id": { "name": "id" },
		"target": { "name": "y", "description": "some target desc." },
		"predictors": []
	}))
	.unwrap();
	let rows = PredictionRows::Regression(vec![RegressionRow {
		sample_id: NumberOrString::String("4656".to_owned()),
		prediction: 5.78058,
	}]);
	let response = build_response(&schema, rows).unwrap();
	let value = serde_json::to_value(&response).unwrap();
	assert!(value.get("targetClasses").is_none());
	assert!(value.get("targetDescription").is_none());
	assert_eq!(
		value["predictions"][0],
		serde_json::json!({ "sampleId": "4656", "prediction": 5.78058 })
	);
}

#[test]
fn test_request_ids_differ_between_calls() {
	let schema = crate::schema::test_schema();
	let rows = || test_rows(&[("879", &[("0", 1.0), ("1", 0.0)])]);
	let a = build_response(&schema, rows()).unwrap();
	let b = build_response(&schema, rows()).unwrap();
	assert_ne!(a.request_id, b.request_id);
	assert_eq!(
		serde_json::to_value(&a.predictions).unwrap(),
		serde_json::to_value(&b.predictions).unwrap(),
	);
}

#[test]
fn test_missing_class_column_is_an_error() {
	let schema = crate::schema::test_schema();
	let rows = PredictionRows::Classification(vec![ClassificationRow {
		sample_id: NumberOrString::String("879".to_owned()),
		probabilities: btreemap! { "0".to_owned() => 1.0 },
	}]);
	let error = build_response(&schema, rows).unwrap_err();
	assert_eq!(
		error.to_string(),
		"class \"1\" is missing from the prediction row for sample \"879\""
	);
}

#[test]
fn test_task_mode_mismatch_is_an_error() {
	let schema = crate::schema::test_schema();
	let rows = PredictionRows::Regression(vec![RegressionRow {
		sample_id: NumberOrString::String("1".to_owned()),
		prediction: 1.0,
	}]);
	assert!(build_response(&schema, rows).is_err());
}

#[test]
fn test_failure_envelope() {
	let response = ErrorResponse::new("id field \"id\" is not present in instance 0".to_owned());
	let value = serde_json::to_value(&response).unwrap();
	assert_eq!(value["status"], "failure");
	assert_eq!(
		value["message"],
		"id field \"id\" is not present in instance 0"
	);
	assert!(value.get("predictions").is_none());
}
