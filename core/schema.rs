use std::path::Path;
use verdict_util::{err, error::Result};

/// The dataset schema. It is loaded once at startup from a json file and describes the id field, the target, and the predictor fields of the dataset the model was trained on.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
	pub title: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub problem_category: ProblemCategory,
	pub version: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub input_data_format: Option<String>,
	pub id: IdField,
	pub target: TargetField,
	pub predictors: Vec<PredictorField>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemCategory {
	BinaryClassification,
	MulticlassClassification,
	Regression,
}

/// The task the schema describes, as seen by the response builder. Binary and multiclass schemas build the same classification envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Task {
	Classification,
	Regression,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IdField {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetField {
	pub name: String,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub allowed_values: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub positive_class: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorField {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub data_type: DataType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub allowed_values: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub example: Option<serde_json::Value>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DataType {
	#[serde(rename = "NUMERIC")]
	Numeric,
	#[serde(rename = "INT")]
	Int,
	#[serde(rename = "REAL")]
	Real,
	#[serde(rename = "CATEGORICAL")]
	Categorical,
}

impl Schema {
	pub fn from_path(path: &Path) -> Result<Self> {
		let file = std::fs::File::open(path)?;
		let schema = serde_json::from_reader(std::io::BufReader::new(file))?;
		Self::check(schema)
	}

	pub fn from_value(value: serde_json::Value) -> Result<Self> {
		let schema = serde_json::from_value(value)?;
		Self::check(schema)
	}

	fn check(schema: Self) -> Result<Self> {
		match schema.problem_category {
			ProblemCategory::BinaryClassification => match &schema.target.allowed_values {
				Some(values) if values.len() == 2 => {}
				_ => {
					return Err(err!(
						"a binary_classification schema must declare exactly 2 allowedValues for the target"
					))
				}
			},
			ProblemCategory::MulticlassClassification => match &schema.target.allowed_values {
				Some(values) if values.len() >= 2 => {}
				_ => {
					return Err(err!(
						"a multiclass_classification schema must declare at least 2 allowedValues for the target"
					))
				}
			},
			ProblemCategory::Regression => {
				if schema.target.allowed_values.is_some() {
					return Err(err!(
						"a regression schema must not declare allowedValues for the target"
					));
				}
			}
		}
		Ok(schema)
	}

	pub fn task(&self) -> Task {
		match self.problem_category {
			ProblemCategory::BinaryClassification | ProblemCategory::MulticlassClassification => {
				Task::Classification
			}
			ProblemCategory::Regression => Task::Regression,
		}
	}

	pub fn id_field_name(&self) -> &str {
		&self.id.name
	}

	pub fn target_field_name(&self) -> &str {
		&self.target.name
	}

	pub fn target_description(&self) -> &str {
		&self.target.description
	}

	/// The target class labels, in schema-declared order. `None` for regression schemas.
	pub fn target_classes(&self) -> Option<&[String]> {
		self.target.allowed_values.as_deref()
	}

	pub fn feature_names(&self) -> impl Iterator<Item = &str> {
		self.predictors.iter().map(|predictor| predictor.name.as_str())
	}

	pub fn numeric_feature_names(&self) -> Vec<&str> {
		self.predictors
			.iter()
			.filter(|predictor| {
				matches!(
					predictor.data_type,
					DataType::Numeric | DataType::Int | DataType::Real
				)
			})
			.map(|predictor| predictor.name.as_str())
			.collect()
	}

	pub fn categorical_feature_names(&self) -> Vec<&str> {
		self.predictors
			.iter()
			.filter(|predictor| predictor.data_type == DataType::Categorical)
			.map(|predictor| predictor.name.as_str())
			.collect()
	}
}

#[cfg(test)]
pub(crate) fn test_schema() -> Schema {
	Schema::from_value(serde_json::json!({
		"title": "test dataset",
		"description": "test dataset",
		"problemCategory": "binary_classification",
		"version": 1.0,
		"inputDataFormat": "CSV",
		"id": {
			"name": "id",
			"description": "unique identifier."
		},
		"target": {
			"name": "target_field",
			"description": "some target desc.",
			"allowedValues": ["0", "1"],
			"positiveClass": "1"
		},
		"predictors": [
			{
				"name": "numeric_feature_1",
				"description": "some desc.",
				"dataType": "NUMERIC",
				"example": 50
			},
			{
				"name": "categorical_feature_1",
				"description": "some desc.",
				"dataType": "CATEGORICAL",
				"allowedValues": ["A", "B", "C"]
			}
		]
	}))
	.unwrap()
}

#[test]
fn test_accessors() {
	let schema = test_schema();
	assert_eq!(schema.id_field_name(), "id");
	assert_eq!(schema.target_field_name(), "target_field");
	assert_eq!(schema.target_description(), "some target desc.");
	assert_eq!(
		schema.target_classes().unwrap(),
		&["0".to_owned(), "1".to_owned()]
	);
	assert_eq!(schema.task(), Task::Classification);
	assert_eq!(
		schema.feature_names().collect::<Vec<_>>(),
		vec!["numeric_feature_1", "categorical_feature_1"]
	);
	assert_eq!(schema.numeric_feature_names(), vec!["numeric_feature_1"]);
	assert_eq!(
		schema.categorical_feature_names(),
		vec!["categorical_feature_1"]
	);
}

#[test]
fn test_classification_schema_requires_classes() {
	let result = Schema::from_value(serde_json::json!({
		"title": "t",
		"problemCategory": "binary_classification",
		"version": 1.0,
		"id": { "name": "id" },
		"target": { "name": "y", "description": "d" },
		"predictors": []
	}));
	assert!(result.is_err());
}

#[test]
fn test_regression_schema_rejects_classes() {
	let result = Schema::from_value(serde_json::json!({
		"title": "t",
		"problemCategory": "regression",
		"version": 1.0,
		"id": { "name": "id" },
		"target": { "name": "y", "description": "d", "allowedValues": ["0", "1"] },
		"predictors": []
	}));
	assert!(result.is_err());
}
