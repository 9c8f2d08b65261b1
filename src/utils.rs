// This file is part of the terraform-provider-sonarqube project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Cow;
use std::fmt::Display;

use tf_provider::{AttributePath, Diagnostics};
use tf_provider::schema::Schema;
use tf_provider::value::Value;

pub(crate) trait WithSchema {
    fn schema() -> Schema;
}

/// Access to string attributes the way SonarQube expects them
pub(crate) trait StrValue {
    /// The string if it is known and not empty
    fn non_empty(&self) -> Option<&str>;
    /// The string, or "" if it is null, unknown or empty
    fn or_empty(&self) -> &str {
        self.non_empty().unwrap_or_default()
    }
}

impl StrValue for Value<String> {
    fn non_empty(&self) -> Option<&str> {
        match self {
            Value::Value(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Build a string value, mapping empty strings to null
pub(crate) fn value_or_null<S: Into<String>>(s: S) -> Value<String> {
    let s = s.into();
    if s.is_empty() {
        Value::Null
    } else {
        Value::Value(s)
    }
}

/// Record errors into diagnostics instead of propagating them
pub(crate) trait OrDiagnostic<T> {
    fn or_diagnostic<S: Into<Cow<'static, str>>>(
        self,
        diags: &mut Diagnostics,
        summary: S,
    ) -> Option<T>;
}

impl<T, E: Display> OrDiagnostic<T> for Result<T, E> {
    fn or_diagnostic<S: Into<Cow<'static, str>>>(
        self,
        diags: &mut Diagnostics,
        summary: S,
    ) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                diags.root_error(summary, err.to_string());
                None
            }
        }
    }
}

/// Add `name` to the replacement triggers if its value changed
pub(crate) fn replace_on_change<T: PartialEq>(
    triggers: &mut Vec<AttributePath>,
    name: &'static str,
    prior: &Value<T>,
    proposed: &Value<T>,
) {
    if prior != proposed {
        triggers.push(AttributePath::new(name));
    }
}

/// Check that exactly one of the attributes is set
///
/// Unknown values are accepted: they will be checked again once known.
pub(crate) fn exactly_one_of(diags: &mut Diagnostics, attributes: &[(&'static str, &Value<String>)]) {
    if attributes.iter().any(|(_, value)| value.is_unknown()) {
        return;
    }
    let set = attributes
        .iter()
        .filter(|(_, value)| value.non_empty().is_some())
        .count();
    if set != 1 {
        let names = attributes
            .iter()
            .map(|(name, _)| format!("`{}`", name))
            .collect::<Vec<_>>()
            .join(", ");
        diags.root_error(
            "Invalid attribute combination",
            format!("Exactly one of {} must be set", names),
        );
    }
}

/// Check that at most one of the attributes is set
pub(crate) fn conflicting(diags: &mut Diagnostics, attributes: &[(&'static str, &Value<String>)]) {
    let set = attributes
        .iter()
        .filter(|(_, value)| value.non_empty().is_some())
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
    if set.len() > 1 {
        diags.error(
            "Conflicting attributes",
            format!("`{}` cannot be set together with `{}`", set[1], set[0]),
            AttributePath::new(set[1]),
        );
    }
}

/// Split a composite id `a/b/...` into exactly `N` parts
pub(crate) fn split_id<const N: usize>(diags: &mut Diagnostics, id: &str, format: &str) -> Option<[String; N]> {
    let parts = id.splitn(N, '/').map(str::to_owned).collect::<Vec<_>>();
    match <[String; N]>::try_from(parts) {
        Ok(parts) if parts.iter().all(|part| !part.is_empty()) => Some(parts),
        _ => {
            diags.root_error(
                "Invalid resource id",
                format!("Id `{}` is not in the format `{}`", id, format),
            );
            None
        }
    }
}

/// Split a composite id `a/b` on its last `/`, so that `a` may itself contain slashes
pub(crate) fn rsplit_id(diags: &mut Diagnostics, id: &str, format: &str) -> Option<[String; 2]> {
    match id.rsplit_once('/') {
        Some((head, tail)) if !head.is_empty() && !tail.is_empty() => {
            Some([head.to_owned(), tail.to_owned()])
        }
        _ => {
            diags.root_error(
                "Invalid resource id",
                format!("Id `{}` is not in the format `{}`", id, format),
            );
            None
        }
    }
}
