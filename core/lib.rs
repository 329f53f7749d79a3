/*!
Verdict core: the dataset schema, the model seam, and the inference response builder.
*/

pub mod model;
pub mod predict;
pub mod schema;
pub mod validate;

pub use self::predict::build_response;
