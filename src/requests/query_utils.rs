use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Anything that can be encoded into a query string with [serde_qs]
pub trait Query: Serialize + std::fmt::Debug {}

#[derive(Serialize, Deserialize, Debug, Clone, Default, Copy)]
pub struct EmptyQuery {}
impl Query for EmptyQuery {}

pub trait ResponseResultOk {
    fn response_result_ok(&self) -> Result<bool>;
}

impl ResponseResultOk for Value {
    fn response_result_ok(&self) -> Result<bool> {
        let result = match self.get("result") {
            Some(status) => status,
            None => return Err(Error::ParseError),
        };

        match result.as_str() {
            Some(result) => Ok(result == "ok"),
            None => Err(Error::ParseError),
        }
    }
}
