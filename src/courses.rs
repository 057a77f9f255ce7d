use crate::error::{ConfigError, LookupError};

use bimap::*;
use indexmap::IndexMap;

/// Subject code <-> display name.
///
/// Both sides are unique, so a filter given by the user can be either a code
/// ("24CS401PC212") or the name printed in the report ("COMPUTER NETWORKS").
#[derive(Clone, Debug)]
pub struct CourseNames {
    names: BiHashMap<String, String>,
}

impl CourseNames {
    pub fn new(pairs: &IndexMap<String, String>) -> Result<Self, ConfigError> {
        let mut names = BiHashMap::new();

        for (code, name) in pairs {
            let code = code.trim().to_string();
            let name = name.trim().to_string();

            if let Err((code, name)) = names.insert_no_overwrite(code, name) {
                let first = names
                    .get_by_right(&name)
                    .cloned()
                    .unwrap_or_else(|| code.clone());

                return Err(ConfigError::DuplicateCourseName {
                    name,
                    first,
                    second: code,
                });
            }
        }

        Ok(Self { names })
    }

    pub fn name_of(&self, code: &str) -> Result<&str, LookupError> {
        self.names
            .get_by_left(code)
            .map(|name| name.as_str())
            .ok_or_else(|| LookupError::UnknownSubject(code.to_string()))
    }

    /// Finds the subject code for a code or a display name, ignoring case.
    pub fn resolve(&self, query: &str) -> Option<&str> {
        let query = query.trim();

        if let Some((code, _)) = self.names.iter().find(|(code, _)| code.as_str() == query) {
            return Some(code.as_str());
        }

        if let Some(code) = self.names.get_by_right(query) {
            return Some(code.as_str());
        }

        self.names
            .iter()
            .find(|(code, name)| code.eq_ignore_ascii_case(query) || name.eq_ignore_ascii_case(query))
            .map(|(code, _)| code.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}
