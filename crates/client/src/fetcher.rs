use crate::client::VeociClient;
use crate::error::{ClientError, Result};
use crate::extract::{form_ids, referenced_form_ids};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
const MAX_CONCURRENT_LIMIT: usize = 32;

/// Raw payloads of one container, as the platform returned them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchedSolution {
    pub container_id: String,
    pub forms: Vec<Value>,

    /// One per entry of `forms`, in the same order. Falls back to the list
    /// item when the definition could not be fetched.
    pub form_definitions: Vec<Value>,

    pub workflows: Vec<Value>,

    /// Forms referenced from this container but living elsewhere
    pub external_forms: Vec<Value>,
}

pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENT_LIMIT)
}

/// Fetches a container's forms, workflows and form definitions with bounded
/// parallelism. No request is retried.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: VeociClient,
    max_concurrent: usize,
}

impl Fetcher {
    pub fn new(client: VeociClient, max_concurrent: usize) -> Self {
        Self {
            client,
            max_concurrent: clamp_concurrency(max_concurrent),
        }
    }

    pub async fn forms_list(&self, container_id: &str) -> Result<Vec<Value>> {
        let value = self.client.get_json("/forms", &[("c", container_id)]).await?;
        as_list(value, "/forms")
    }

    pub async fn workflows_list(&self, container_id: &str) -> Result<Vec<Value>> {
        let value = self
            .client
            .get_json("/workflows", &[("c", container_id)])
            .await?;
        as_list(value, "/workflows")
    }

    pub async fn form_definition(&self, form_id: &str) -> Result<Value> {
        self.client.get_json(&format!("/forms/{form_id}"), &[]).await
    }

    pub async fn fetch_solution(&self, container_id: &str) -> Result<FetchedSolution> {
        let (forms, workflows) = tokio::try_join!(
            self.forms_list(container_id),
            self.workflows_list(container_id)
        )?;
        log::info!("Found {} forms, {} workflows", forms.len(), workflows.len());

        let form_definitions = self.form_definitions(&forms).await;
        log::info!("Fetched {} form definitions", form_definitions.len());

        let known: BTreeSet<String> = forms.iter().flat_map(form_ids).collect();
        let missing: BTreeSet<String> = referenced_form_ids(&form_definitions)
            .into_iter()
            .filter(|id| !known.contains(id))
            .collect();
        let external_forms = self.external_forms(missing).await;

        Ok(FetchedSolution {
            container_id: container_id.to_string(),
            forms,
            form_definitions,
            workflows,
            external_forms,
        })
    }

    /// Definitions in list order; a failed fetch keeps the list item
    async fn form_definitions(&self, forms: &[Value]) -> Vec<Value> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut set = JoinSet::new();

        for (idx, form) in forms.iter().enumerate() {
            let Some(form_id) = form_ids(form).into_iter().next() else {
                continue;
            };
            let this = self.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (idx, form_id.clone(), this.form_definition(&form_id).await)
            });
        }

        let mut definitions = forms.to_vec();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, _, Ok(definition))) => definitions[idx] = definition,
                Ok((_, form_id, Err(err))) => {
                    log::warn!("Failed to fetch form {form_id}, using list entry: {err}");
                }
                Err(err) => log::warn!("Form definition task failed: {err}"),
            }
        }
        definitions
    }

    async fn external_forms(&self, ids: BTreeSet<String>) -> Vec<Value> {
        if ids.is_empty() {
            return Vec::new();
        }
        log::info!("Fetching {} external forms", ids.len());

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut set = JoinSet::new();
        for form_id in ids {
            let this = self.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (form_id.clone(), this.form_definition(&form_id).await)
            });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((form_id, Ok(mut form))) => {
                    if let Value::Object(map) = &mut form {
                        map.insert("external".to_string(), Value::Bool(true));
                    }
                    fetched.push((form_id, form));
                }
                Ok((form_id, Err(err))) => {
                    log::warn!("Could not fetch external form {form_id}: {err}");
                }
                Err(err) => log::warn!("External form task failed: {err}"),
            }
        }

        // completion order is arbitrary
        fetched.sort_by(|a, b| a.0.cmp(&b.0));
        log::info!("Fetched {} external forms", fetched.len());
        fetched.into_iter().map(|(_, form)| form).collect()
    }
}

/// Lists come back bare or wrapped in an `items`/`data`/`results` envelope
fn as_list(value: Value, path: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => ["items", "data", "results"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| ClientError::InvalidResponse {
                url: path.to_string(),
                message: "expected a JSON array".to_string(),
            }),
        other => Err(ClientError::InvalidResponse {
            url: path.to_string(),
            message: format!("expected a JSON array, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn lists_accept_bare_and_wrapped_arrays() {
        assert_eq!(as_list(json!([1, 2]), "/forms").unwrap().len(), 2);
        assert_eq!(as_list(json!({"items": [1]}), "/forms").unwrap().len(), 1);
        assert_eq!(as_list(json!({"data": []}), "/forms").unwrap().len(), 0);
        assert!(matches!(
            as_list(json!({"forms": []}), "/forms"),
            Err(ClientError::InvalidResponse { .. })
        ));
        assert!(as_list(json!("nope"), "/forms").is_err());
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(5), 5);
        assert_eq!(clamp_concurrency(1000), MAX_CONCURRENT_LIMIT);
    }
}
