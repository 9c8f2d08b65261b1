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

//! [`ServerVersion`] module

use std::fmt::Display;
use std::str::FromStr;

use crate::client::Error;

/// Version of a SonarQube server, as a list of numeric components
///
/// SonarQube reports versions like `10.4.1.88267`: the build number is kept
/// as a regular component so that ordering stays lexicographic.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct ServerVersion(Vec<u64>);

impl ServerVersion {
    /// Check if the server is at least `major.minor`
    pub fn at_least(&self, major: u64, minor: u64) -> bool {
        self.0.as_slice() >= [major, minor].as_slice()
    }
}

impl FromStr for ServerVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Drop qualifiers such as `-SNAPSHOT` or `-RC1`
        let numeric = s.trim().split(['-', '+']).next().unwrap_or_default();
        let components = numeric
            .split('.')
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::Version(s.to_owned()))?;
        if components.is_empty() {
            return Err(Error::Version(s.to_owned()));
        }
        Ok(Self(components))
    }
}

impl Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sep = "";
        for component in &self.0 {
            write!(f, "{}{}", sep, component)?;
            sep = ".";
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ServerVersion;

    #[test]
    fn parse_build_number() {
        let version: ServerVersion = "10.4.1.88267".parse().unwrap();
        assert_eq!(version.to_string(), "10.4.1.88267");
        assert!(version.at_least(9, 2));
        assert!(version.at_least(10, 4));
        assert!(!version.at_least(10, 5));
    }

    #[test]
    fn parse_qualifier() {
        let version: ServerVersion = "9.9-SNAPSHOT".parse().unwrap();
        assert_eq!(version.to_string(), "9.9");
        assert!(version.at_least(9, 2));
        assert!(!version.at_least(10, 0));
    }

    #[test]
    fn ordering_is_numeric() {
        let old: ServerVersion = "9.10".parse().unwrap();
        let new: ServerVersion = "10.0".parse().unwrap();
        assert!(old < new);
        assert!("8.9.10".parse::<ServerVersion>().unwrap() < old);
    }

    #[test]
    fn reject_garbage() {
        assert!("".parse::<ServerVersion>().is_err());
        assert!("ten".parse::<ServerVersion>().is_err());
        assert!("10..1".parse::<ServerVersion>().is_err());
    }
}
