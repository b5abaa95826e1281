mod query;
mod token;

pub use query::{GroupQuery, PageQuery, tri_state};
pub use token::{AdminToken, Token, bearer_token};
