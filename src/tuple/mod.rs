mod data_type;
mod schema;
mod tuple;
mod value;

pub use data_type::*;
pub use schema::*;
pub use tuple::*;
pub use value::*;
