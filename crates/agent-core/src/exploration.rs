//! Exploration mode: learn what a site offers before any task targets it.
//!
//! A breadth-first crawl records a short excerpt per same-host page, then
//! the control loop runs with a fixed discovery goal. Everything learned is
//! filed under the `exploration` category keyed by host, ready to be put in
//! front of the oracle on later tasks against the same site.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use action_primitives::{normalize_url, Primitive, PrimitiveOutcome};
use chrono::Utc;
use memory_center::MemoryEntry;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;
use webpilot_core_types::{host_of, page_key, truncate_chars};

use crate::agent_loop::{AgentLoopController, AgentLoopResult, DerivedFact, RunMode, RunOptions};
use crate::errors::AgentError;
use crate::executor::WEBSITE_CATEGORY;

/// Category for facts harvested by exploration runs.
pub const EXPLORATION_CATEGORY: &str = "exploration";

/// Anchors read per crawled page.
const CRAWL_LINK_LIMIT: usize = 100;

pub fn discovery_goal(url: &str) -> String {
    format!(
        "Explore {url} and identify the actions and features this site offers. \
         Note how navigation, search and forms work, then finish with a short overview."
    )
}

/// Re-file a fact for the current run mode. Exploration facts land in the
/// `exploration` category under a key prefixed by the explored host.
pub(crate) fn route_fact(mode: &RunMode, fact: DerivedFact) -> DerivedFact {
    let RunMode::Exploration { host } = mode else {
        return fact;
    };
    let lowered = fact.key.to_ascii_lowercase();
    let under_host = lowered == *host
        || lowered
            .strip_prefix(host.as_str())
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with(':'));
    let key = if under_host {
        fact.key
    } else {
        format!("{host}/{}", fact.key)
    };
    DerivedFact::new(EXPLORATION_CATEGORY, key, fact.value)
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplorationReport {
    pub host: String,
    pub start_url: String,
    /// Pages visited by the crawl, in visit order.
    pub pages_crawled: Vec<String>,
    /// Outcome of the discovery run. Not a task result.
    pub loop_result: AgentLoopResult,
    /// `website` and `exploration` entries about the host after the run.
    pub entries: Vec<MemoryEntry>,
}

pub struct ExplorationController {
    controller: Arc<AgentLoopController>,
}

impl ExplorationController {
    pub fn new(controller: Arc<AgentLoopController>) -> Self {
        Self { controller }
    }

    pub async fn explore(&self, start_url: &str) -> Result<ExplorationReport, AgentError> {
        let url = normalize_url(start_url).map_err(|err| AgentError::invalid_request(err.to_string()))?;
        let host = host_of(&url)
            .ok_or_else(|| AgentError::invalid_request(format!("'{url}' has no host to explore")))?;
        let memory = self.controller.memory();
        memory.ensure_loaded();

        info!(url = %url, host = %host, "starting exploration");
        let pages_crawled = self.crawl(&url, &host).await?;

        let options = RunOptions::task()
            .mode(RunMode::Exploration { host: host.clone() })
            .open(url.clone());
        let loop_result = self.controller.run(&discovery_goal(&url), options).await;

        memory.merge(
            EXPLORATION_CATEGORY,
            &host,
            json!({
                "status": loop_result.status,
                "iterations": loop_result.iterations,
                "pages_crawled": pages_crawled.len(),
                "final_output": loop_result.final_output,
                "explored_at": Utc::now().to_rfc3339(),
            }),
        );
        memory.save()?;

        let entries = memory
            .facts_for_host(&host)
            .into_iter()
            .filter(|entry| entry.category == WEBSITE_CATEGORY || entry.category == EXPLORATION_CATEGORY)
            .collect();
        Ok(ExplorationReport {
            host,
            start_url: url,
            pages_crawled,
            loop_result,
            entries,
        })
    }

    /// Breadth-first over same-host links, bounded by depth and page count.
    /// Unreachable pages are skipped; only a lost session aborts.
    async fn crawl(&self, start_url: &str, host: &str) -> Result<Vec<String>, AgentError> {
        let config = self.controller.config();
        let session = self.controller.session();
        let memory = self.controller.memory();
        let cancel = self.controller.cancel_token();

        let mut queue = VecDeque::from([(start_url.to_string(), 0u32)]);
        let mut seen = HashSet::from([start_url.to_string()]);
        let mut visited = Vec::new();

        while let Some((url, depth)) = queue.pop_front() {
            if visited.len() >= config.exploration_max_pages || cancel.is_cancelled() {
                break;
            }
            if depth >= config.exploration_depth {
                continue;
            }
            info!(url = %url, depth, "crawling page");

            // The first page goes through `open`, which also launches the browser.
            let loaded = if visited.is_empty() {
                session.open(&url).await
            } else {
                let navigate = Primitive::Navigate {
                    url: url.clone(),
                    timeout: config.navigation_timeout(),
                };
                session.perform(&navigate).await.map(|_| ())
            };
            if let Err(err) = loaded {
                if err.is_fatal() {
                    return Err(err.into());
                }
                warn!(url = %url, error = %err, "skipping unreachable page");
                continue;
            }
            let observation = match session.current_observation().await {
                Ok(observation) => observation,
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    warn!(url = %url, error = %err, "skipping unreadable page");
                    continue;
                }
            };
            visited.push(url.clone());

            if let Some(key) = page_key(&observation.url) {
                memory.merge(
                    WEBSITE_CATEGORY,
                    &key,
                    json!({
                        "title": observation.title,
                        "excerpt": truncate_chars(observation.visible_text.trim(), config.excerpt_chars),
                    }),
                );
            }

            if depth + 1 >= config.exploration_depth {
                continue;
            }
            match session
                .perform(&Primitive::ExtractLinks {
                    limit: CRAWL_LINK_LIMIT,
                })
                .await
            {
                Ok(PrimitiveOutcome::Links(links)) => {
                    for link in links {
                        let Some(next) = same_host_link(&link.url, host) else {
                            continue;
                        };
                        if seen.insert(next.clone()) {
                            queue.push_back((next, depth + 1));
                        }
                    }
                }
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => warn!(url = %url, error = %err, "could not read links"),
            }
        }

        if let Err(err) = memory.save() {
            warn!(error = %err, "memory flush after crawl failed");
        }
        info!(host, pages = visited.len(), "crawl finished");
        Ok(visited)
    }
}

/// `http(s)` link on `host`, without its fragment.
fn same_host_link(raw: &str, host: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if !url.host_str()?.eq_ignore_ascii_case(host) {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}
