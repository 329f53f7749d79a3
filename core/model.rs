use crate::predict::{
	self, ClassificationRow, InferenceResponse, PredictInput, PredictionRows, RegressionRow,
};
use crate::schema::{Schema, Task};
use crate::validate;
use itertools::izip;
use ndarray::prelude::*;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use verdict_util::{err, error::Result};

/// The output of a predictor: one probability row per instance for classification, one scalar per instance for regression.
#[derive(Debug)]
pub enum Output {
	Classification(ClassificationOutput),
	Regression(RegressionOutput),
}

#[derive(Debug)]
pub struct ClassificationOutput {
	/// The class labels the model was trained with, in the model's column order.
	pub classes: Vec<String>,
	/// `instances x classes`, columns aligned to `classes`.
	pub probabilities: Array2<f64>,
}

#[derive(Debug)]
pub struct RegressionOutput {
	pub predictions: Array1<f64>,
}

/// The seam to the trained model and its preprocessing pipeline. Implementations are shared read-only across concurrent requests.
pub trait Predictor {
	fn predict(&self, instances: &[serde_json::Map<String, serde_json::Value>]) -> Result<Output>;
}

/// A model artifact: a one byte format version followed by an rmp-serde payload.
///
/// The bundled variants are class-prior baselines. Real models implement `Predictor` and plug into `ModelServer` directly.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub enum Model {
	Regressor(Regressor),
	Classifier(Classifier),
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Classifier {
	pub classes: Vec<String>,
	pub priors: Vec<f64>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Regressor {
	pub mean: f64,
}

impl Model {
	/// Deserialize a `Model` from a slice.
	pub fn from_slice(slice: &[u8]) -> Result<Self> {
		let major_version = *slice
			.first()
			.ok_or_else(|| err!("empty model artifact"))?;
		if major_version != 0 {
			return Err(err!("unknown major version {}", major_version));
		}
		let slice = &slice[1..];
		let model: Self = rmp_serde::from_read_ref(slice)?;
		Ok(model)
	}

	/// Deserialize a `Model` by reading the file at `path`.
	pub fn from_path(path: &Path) -> Result<Self> {
		let file = std::fs::File::open(path)?;
		let mut reader = std::io::BufReader::new(file);
		let mut major_version = [0u8; 1];
		reader.read_exact(&mut major_version)?;
		let major_version = major_version[0];
		if major_version != 0 {
			return Err(err!("unknown major version {}", major_version));
		}
		let model: Self = rmp_serde::from_read(&mut reader)?;
		Ok(model)
	}

	/// Write this model to the file at `path`.
	pub fn to_file(&self, path: &Path) -> Result<()> {
		let file = std::fs::File::create(path)?;
		let mut writer = std::io::BufWriter::new(file);
		writer.write_all(&[0])?;
		rmp_serde::encode::write_named(&mut writer, self)?;
		Ok(())
	}

	pub fn task(&self) -> Task {
		match self {
			Model::Regressor(_) => Task::Regression,
			Model::Classifier(_) => Task::Classification,
		}
	}
}

impl Predictor for Model {
	fn predict(&self, instances: &[serde_json::Map<String, serde_json::Value>]) -> Result<Output> {
		let n_instances = instances.len();
		match self {
			Model::Classifier(model) => {
				if model.priors.len() != model.classes.len() {
					return Err(err!(
						"the classifier artifact has {} priors for {} classes",
						model.priors.len(),
						model.classes.len()
					));
				}
				let probabilities =
					Array2::from_shape_fn((n_instances, model.classes.len()), |(_, class_index)| {
						model.priors[class_index]
					});
				Ok(Output::Classification(ClassificationOutput {
					classes: model.classes.clone(),
					probabilities,
				}))
			}
			Model::Regressor(model) => Ok(Output::Regression(RegressionOutput {
				predictions: Array1::from_elem(n_instances, model.mean),
			})),
		}
	}
}

/// The request-handling context: the schema plus the predictor, constructed once at startup and shared across requests. `predict` validates the instances, threads the sample ids through, and hands the prediction rows to the response builder.
pub struct ModelServer {
	schema: Schema,
	model: Box<dyn Predictor + Send + Sync>,
}

impl ModelServer {
	pub fn new(schema: Schema, model: Box<dyn Predictor + Send + Sync>) -> Self {
		Self { schema, model }
	}

	pub fn schema(&self) -> &Schema {
		&self.schema
	}

	pub fn predict(&self, instances: &PredictInput) -> Result<InferenceResponse> {
		validate::validate_instances(&self.schema, instances)?;
		let sample_ids = validate::sample_ids(&self.schema, instances)?;
		let rows = match self.model.predict(instances)? {
			Output::Classification(output) => {
				if output.probabilities.nrows() != instances.len() {
					return Err(err!(
						"the model returned {} prediction rows for {} instances",
						output.probabilities.nrows(),
						instances.len()
					));
				}
				let rows = izip!(sample_ids, output.probabilities.genrows())
					.map(|(sample_id, probabilities)| ClassificationRow {
						sample_id,
						probabilities: probabilities
							.iter()
							.zip(output.classes.iter())
							.map(|(probability, class)| (class.clone(), *probability))
							.collect::<BTreeMap<String, f64>>(),
					})
					.collect();
				PredictionRows::Classification(rows)
			}
			Output::Regression(output) => {
				if output.predictions.len() != instances.len() {
					return Err(err!(
						"the model returned {} predictions for {} instances",
						output.predictions.len(),
						instances.len()
					));
				}
				let rows = izip!(sample_ids, output.predictions.iter())
					.map(|(sample_id, prediction)| RegressionRow {
						sample_id,
						prediction: *prediction,
					})
					.collect();
				PredictionRows::Regression(rows)
			}
		};
		predict::build_response(&self.schema, rows)
	}
}

#[cfg(test)]
fn test_classifier() -> Model {
	Model::Classifier(Classifier {
		classes: vec!["0".to_owned(), "1".to_owned()],
		priors: vec![0.97548, 0.02452],
	})
}

#[cfg(test)]
fn test_instances(ids: &[&str]) -> PredictInput {
	ids.iter()
		.map(|id| {
			match serde_json::json!({
				"id": id,
				"numeric_feature_1": 7.8958,
				"categorical_feature_1": "A"
			}) {
				serde_json::Value::Object(map) => map,
				_ => unreachable!(),
			}
		})
		.collect()
}

#[test]
fn test_artifact_round_trip() {
	let path = std::env::temp_dir().join(format!(
		"verdict_model_{}.bin",
		verdict_util::id::Id::new()
	));
	test_classifier().to_file(&path).unwrap();
	let loaded = Model::from_path(&path).unwrap();
	std::fs::remove_file(&path).unwrap();
	match loaded {
		Model::Classifier(classifier) => {
			assert_eq!(classifier.classes, vec!["0".to_owned(), "1".to_owned()]);
			assert_eq!(classifier.priors, vec![0.97548, 0.02452]);
		}
		Model::Regressor(_) => unreachable!(),
	}
}

#[test]
fn test_unknown_artifact_version() {
	let error = Model::from_slice(&[1, 0, 0]).unwrap_err();
	assert_eq!(error.to_string(), "unknown major version 1");
}

#[test]
fn test_model_server_predict() {
	let server = ModelServer::new(crate::schema::test_schema(), Box::new(test_classifier()));
	let response = server.predict(&test_instances(&["879", "880"])).unwrap();
	let value = serde_json::to_value(&response).unwrap();
	assert_eq!(value["status"], "success");
	assert_eq!(value["targetClasses"], serde_json::json!(["0", "1"]));
	assert_eq!(
		value["predictions"],
		serde_json::json!([
			{
				"sampleId": "879",
				"predictedClass": "0",
				"predictedProbabilities": [0.97548, 0.02452]
			},
			{
				"sampleId": "880",
				"predictedClass": "0",
				"predictedProbabilities": [0.97548, 0.02452]
			}
		])
	);
}

#[test]
fn test_model_server_predict_regression() {
	let schema = crate::schema::Schema::from_value(serde_json::json!({
		"title": "test dataset",
		"problemCategory": "regression",
		"version": 1.0,
		"id": { "name": "id" },
		"target": { "name": "y", "description": "some target desc." },
		"predictors": []
	}))
	.unwrap();
	let server = ModelServer::new(schema, Box::new(Model::Regressor(Regressor { mean: 5.78058 })));
	let response = server.predict(&test_instances(&["4656"])).unwrap();
	let value = serde_json::to_value(&response).unwrap();
	assert!(value.get("targetClasses").is_none());
	assert!(value.get("targetDescription").is_none());
	assert_eq!(
		value["predictions"],
		serde_json::json!([{ "sampleId": "4656", "prediction": 5.78058 }])
	);
}

#[test]
fn test_model_server_rejects_invalid_instance() {
	let server = ModelServer::new(crate::schema::test_schema(), Box::new(test_classifier()));
	let mut instances = test_instances(&["879"]);
	instances[0].remove("numeric_feature_1");
	let error = server.predict(&instances).unwrap_err();
	assert!(error
		.downcast_ref::<crate::validate::InvalidInstance>()
		.is_some());
}

#[test]
fn test_model_task_mismatch_is_an_error() {
	let server = ModelServer::new(
		crate::schema::test_schema(),
		Box::new(Model::Regressor(Regressor { mean: 5.78058 })),
	);
	assert!(server.predict(&test_instances(&["879"])).is_err());
}
