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

//! Managed SonarQube entities

mod alm_github;
mod github_binding;
mod group;
mod new_code_periods;
mod permissions;
mod project;
mod qualitygate_project_association;
mod qualitygate_usergroup_association;
mod qualityprofile_project_association;
mod user_external_identity;
mod webhook;

pub use alm_github::AlmGithubResource;
pub use github_binding::GithubBindingResource;
pub use group::GroupResource;
pub use new_code_periods::NewCodePeriodResource;
pub use permissions::PermissionsResource;
pub use project::ProjectResource;
pub use qualitygate_project_association::QualityGateProjectAssociationResource;
pub use qualitygate_usergroup_association::QualityGateUserGroupAssociationResource;
pub use qualityprofile_project_association::QualityProfileProjectAssociationResource;
pub use user_external_identity::UserExternalIdentityResource;
pub use webhook::WebhookResource;
