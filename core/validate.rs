use crate::predict::NumberOrString;
use crate::schema::Schema;
use thiserror::Error;
use verdict_util::error::Result;

/// A caller-visible validation failure in the request instances. The app layer maps these to a 400 failure envelope; everything else is a 500.
#[derive(Debug, Error)]
pub enum InvalidInstance {
	#[error("id field \"{field}\" is not present in instance {index}")]
	MissingIdField { field: String, index: usize },
	#[error("id field \"{field}\" is malformed in instance {index}")]
	MalformedIdField { field: String, index: usize },
	#[error("feature \"{field}\" is not present in instance {index}")]
	MissingFeature { field: String, index: usize },
}

/// Check that every instance carries the id field key and every predictor field key declared by the schema. A json `null` value passes: imputation belongs to the preprocessing pipeline, only absent keys are rejected.
pub fn validate_instances(
	schema: &Schema,
	instances: &[serde_json::Map<String, serde_json::Value>],
) -> Result<()> {
	for (index, instance) in instances.iter().enumerate() {
		if !instance.contains_key(schema.id_field_name()) {
			return Err(InvalidInstance::MissingIdField {
				field: schema.id_field_name().to_owned(),
				index,
			}
			.into());
		}
		for feature in schema.feature_names() {
			if !instance.contains_key(feature) {
				return Err(InvalidInstance::MissingFeature {
					field: feature.to_owned(),
					index,
				}
				.into());
			}
		}
	}
	Ok(())
}

/// Pull the sample identifiers out of the instances, preserving each one's json type.
pub fn sample_ids(
	schema: &Schema,
	instances: &[serde_json::Map<String, serde_json::Value>],
) -> Result<Vec<NumberOrString>> {
	instances
		.iter()
		.enumerate()
		.map(|(index, instance)| match instance.get(schema.id_field_name()) {
			Some(serde_json::Value::String(value)) => Ok(NumberOrString::String(value.clone())),
			Some(serde_json::Value::Number(value)) => Ok(NumberOrString::Number(value.clone())),
			None => Err(InvalidInstance::MissingIdField {
				field: schema.id_field_name().to_owned(),
				index,
			}
			.into()),
			Some(_) => Err(InvalidInstance::MalformedIdField {
				field: schema.id_field_name().to_owned(),
				index,
			}
			.into()),
		})
		.collect()
}

#[cfg(test)]
fn test_instance() -> serde_json::Map<String, serde_json::Value> {
	match serde_json::json!({
		"id": "879",
		"numeric_feature_1": 7.8958,
		"categorical_feature_1": "A"
	}) {
		serde_json::Value::Object(map) => map,
		_ => unreachable!(),
	}
}

#[test]
fn test_valid_instance() {
	let schema = crate::schema::test_schema();
	assert!(validate_instances(&schema, &[test_instance()]).is_ok());
}

#[test]
fn test_null_feature_value_passes() {
	let schema = crate::schema::test_schema();
	let mut instance = test_instance();
	instance.insert("numeric_feature_1".to_owned(), serde_json::Value::Null);
	assert!(validate_instances(&schema, &[instance]).is_ok());
}

#[test]
fn test_missing_id_field() {
	let schema = crate::schema::test_schema();
	let mut instance = test_instance();
	instance.remove("id");
	let error = validate_instances(&schema, &[instance]).unwrap_err();
	assert!(error.downcast_ref::<InvalidInstance>().is_some());
	assert_eq!(
		error.to_string(),
		"id field \"id\" is not present in instance 0"
	);
}

#[test]
fn test_missing_feature() {
	let schema = crate::schema::test_schema();
	let mut instance = test_instance();
	instance.remove("categorical_feature_1");
	let error = validate_instances(&schema, &[instance]).unwrap_err();
	assert_eq!(
		error.to_string(),
		"feature \"categorical_feature_1\" is not present in instance 0"
	);
}

#[test]
fn test_sample_ids_preserve_json_type() {
	let schema = crate::schema::test_schema();
	let mut number_instance = test_instance();
	number_instance.insert("id".to_owned(), serde_json::json!(879));
	let ids = sample_ids(&schema, &[test_instance(), number_instance]).unwrap();
	assert_eq!(
		serde_json::to_value(&ids).unwrap(),
		serde_json::json!(["879", 879])
	);
}

#[test]
fn test_null_id_is_malformed() {
	let schema = crate::schema::test_schema();
	let mut instance = test_instance();
	instance.insert("id".to_owned(), serde_json::Value::Null);
	let error = sample_ids(&schema, &[instance]).unwrap_err();
	assert_eq!(error.to_string(), "id field \"id\" is malformed in instance 0");
}
