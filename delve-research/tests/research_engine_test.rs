//! Research tree scenarios driven by mock collaborators

mod common;

use common::*;
use delve_core::{DelveConfig, DelveError};
use delve_research::{DeepResearch, ResearchProgress};
use std::time::Duration;

fn two_branch_chat(
    digest_q2: &'static str,
) -> std::sync::Arc<MockLlmClient> {
    MockLlmClient::new(move |prompt| {
        if is_plan(prompt) {
            Ok(plan_json(&[("q1", "goal one"), ("q2", "goal two")]))
        } else if is_digest(prompt) {
            match query_of(prompt) {
                "q1" => Ok(digest_json(&["L1"], &[])),
                _ => Ok(digest_q2.to_string()),
            }
        } else {
            Ok("{}".to_string())
        }
    })
}

#[tokio::test]
async fn test_single_level_collects_all_branches() {
    let chat = two_branch_chat(r#"{"learnings": ["L2"], "followUpQuestions": []}"#);
    let search = MockSearch::new(|query| match query {
        "q1" => results(vec![page("https://u1", "content about q1")]),
        "q2" => results(vec![page("https://u2", "content about q2")]),
        _ => results(vec![]),
    });

    let research = research_with(chat.clone(), search.clone());
    let result = research.run_research("topic", 2, 1).await.unwrap();

    assert_eq!(sorted(result.learnings), vec!["L1", "L2"]);
    assert_eq!(sorted(result.visited_urls), vec!["https://u1", "https://u2"]);
    assert_eq!(sorted(search.queries()), vec!["q1", "q2"]);
    // one plan + one digest per branch
    assert_eq!(chat.calls(), 3);
}

#[tokio::test]
async fn test_empty_plan_stops_without_searching() {
    let chat = MockLlmClient::always(r#"{"queries": []}"#);
    let search = MockSearch::new(|_| results(vec![]));

    let research = research_with(chat.clone(), search.clone());
    let result = research.run_research("topic", 4, 3).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(search.calls(), 0);
    assert_eq!(chat.calls(), 1);
}

#[tokio::test]
async fn test_zero_depth_returns_immediately() {
    let chat = two_branch_chat(r#"{"learnings": ["L2"], "followUpQuestions": []}"#);
    let search = MockSearch::new(|query| results(vec![page("https://u", query)]));

    let result = research_with(chat.clone(), search.clone())
        .run_research("X", 2, 0)
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(search.calls(), 0);
    assert_eq!(chat.calls(), 0);
}

#[tokio::test]
async fn test_malformed_plan_is_empty_plan() {
    let chat = MockLlmClient::always("I would search for batteries first.");
    let search = MockSearch::new(|_| results(vec![]));

    let result = research_with(chat, search.clone())
        .run_research("topic", 2, 2)
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn test_visited_urls_are_deduplicated() {
    let chat = two_branch_chat(r#"{"learnings": ["L1"], "followUpQuestions": []}"#);
    let search = MockSearch::new(|query| results(vec![page("https://a", query)]));

    let result = research_with(chat, search)
        .run_research("topic", 2, 1)
        .await
        .unwrap();

    assert_eq!(result.visited_urls, vec!["https://a"]);
    assert_eq!(result.learnings, vec!["L1"]);
}

#[tokio::test]
async fn test_malformed_digest_only_drops_its_branch() {
    let chat = two_branch_chat("the results were interesting");
    let search = MockSearch::new(|query| match query {
        "q1" => results(vec![page("https://u1", "c1")]),
        _ => results(vec![page("https://u2", "c2")]),
    });

    let result = research_with(chat, search)
        .run_research("topic", 2, 1)
        .await
        .unwrap();

    assert_eq!(result.learnings, vec!["L1"]);
    assert_eq!(result.visited_urls, vec!["https://u1"]);
}

#[tokio::test]
async fn test_search_failure_only_drops_its_branch() {
    let chat = two_branch_chat(r#"{"learnings": ["L2"], "followUpQuestions": []}"#);
    let search = MockSearch::new(|query| match query {
        "q1" => results(vec![page("https://u1", "c1")]),
        _ => Err(network_error()),
    });
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let research = DeepResearch::builder(&DelveConfig::default())
        .with_providers(chat, search)
        .with_progress(tx)
        .build()
        .unwrap();
    let result = research.run_research("topic", 2, 1).await.unwrap();

    assert_eq!(result.learnings, vec!["L1"]);
    assert_eq!(result.visited_urls, vec!["https://u1"]);

    drop(research);
    let mut failures = Vec::new();
    while let Some(event) = rx.recv().await {
        if let ResearchProgress::QueryFailed { query, kind, .. } = event {
            failures.push((query, kind));
        }
    }
    assert_eq!(failures, vec![("q2".to_string(), "network".to_string())]);
}

#[tokio::test]
async fn test_every_branch_failing_yields_empty_result() {
    let chat = two_branch_chat(r#"{"learnings": ["L2"], "followUpQuestions": []}"#);
    let search = MockSearch::new(|_| Err(network_error()));

    let result = research_with(chat, search)
        .run_research("topic", 2, 2)
        .await
        .unwrap();

    assert!(result.is_empty());
}

#[tokio::test]
async fn test_recursion_halves_breadth_and_carries_context() {
    let chat = MockLlmClient::new(|prompt| {
        if is_plan(prompt) {
            if topic_of(prompt).starts_with("Previous research goal") {
                // more than the halved breadth allows
                Ok(plan_json(&[("q1-deeper", "dig in"), ("extra", "ignored")]))
            } else {
                Ok(plan_json(&[("q1", "goal one"), ("q2", "goal two")]))
            }
        } else if is_digest(prompt) {
            match query_of(prompt) {
                "q1" => Ok(digest_json(&["L1"], &["What about cost?"])),
                "q2" => Ok(digest_json(&["L2"], &["What about safety?"])),
                _ => Ok(digest_json(&["L-deep"], &[])),
            }
        } else {
            Ok("{}".to_string())
        }
    });
    let search = MockSearch::new(|query| {
        results(vec![page(&format!("https://{}", query), &format!("about {}", query))])
    });

    let result = research_with(chat.clone(), search.clone())
        .run_research("topic", 2, 2)
        .await
        .unwrap();

    assert_eq!(sorted(result.learnings), vec!["L-deep", "L1", "L2"]);
    assert_eq!(
        sorted(result.visited_urls),
        vec!["https://q1", "https://q1-deeper", "https://q2"]
    );
    // root: q1, q2; each branch plans one deeper query (both named q1-deeper)
    assert_eq!(search.calls(), 4);
    assert!(!search.queries().contains(&"extra".to_string()));

    let nested_plans: Vec<String> = chat
        .prompts()
        .into_iter()
        .filter(|p| is_plan(p) && topic_of(p).starts_with("Previous research goal"))
        .collect();
    assert_eq!(nested_plans.len(), 2);

    let q1_plan = nested_plans
        .iter()
        .find(|p| topic_of(p).contains("goal one"))
        .expect("nested plan for q1");
    assert!(topic_of(q1_plan)
        .ends_with("Follow-up research directions: \nWhat about cost?"));
    assert!(q1_plan.contains("at most 1 queries"));
    // the branch's own learnings feed the next plan
    assert!(q1_plan.contains("L1"));
    assert!(!q1_plan.contains("L2"));
}

#[tokio::test]
async fn test_root_planner_auth_failure_aborts() {
    let chat = MockLlmClient::new(|_| Err(auth_error()));
    let search = MockSearch::new(|_| results(vec![]));

    let err = research_with(chat, search)
        .run_research("topic", 2, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, DelveError::Authentication { .. }));
}

#[tokio::test]
async fn test_nested_planner_auth_failure_degrades_branch() {
    let chat = MockLlmClient::new(|prompt| {
        if is_plan(prompt) {
            if topic_of(prompt).starts_with("Previous research goal") {
                Err(auth_error())
            } else {
                Ok(plan_json(&[("q1", "goal one")]))
            }
        } else {
            Ok(digest_json(&["L1"], &["more?"]))
        }
    });
    let search = MockSearch::new(|_| results(vec![page("https://u1", "c1")]));

    let result = research_with(chat, search)
        .run_research("topic", 2, 2)
        .await
        .unwrap();

    assert!(result.is_empty());
}

#[tokio::test]
async fn test_progress_events_describe_the_tree() {
    let chat = two_branch_chat(r#"{"learnings": ["L2"], "followUpQuestions": []}"#);
    let search = MockSearch::new(|query| results(vec![page(&format!("https://{}", query), "c")]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let research = DeepResearch::builder(&DelveConfig::default())
        .with_providers(chat, search)
        .with_progress(tx)
        .build()
        .unwrap();
    research.run_research("topic", 2, 1).await.unwrap();
    drop(research);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(
        events.first(),
        Some(&ResearchProgress::Planned {
            depth: 1,
            queries: vec!["q1".to_string(), "q2".to_string()],
        })
    );
    let started = events
        .iter()
        .filter(|e| matches!(e, ResearchProgress::QueryStarted { .. }))
        .count();
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ResearchProgress::QueryCompleted { learnings, urls, .. } => Some((*learnings, *urls)),
            _ => None,
        })
        .collect();
    assert_eq!(started, 2);
    assert_eq!(completed, vec![(1, 1), (1, 1)]);
}

#[tokio::test]
async fn test_worker_pool_bounds_sibling_branches() {
    let chat = MockLlmClient::new(|prompt| {
        if is_plan(prompt) {
            Ok(plan_json(&[("a", ""), ("b", ""), ("c", ""), ("d", "")]))
        } else {
            Ok(digest_json(&[query_of(prompt)], &[]))
        }
    });
    let search = MockSearch::with_delay(Duration::from_millis(20), |query| {
        results(vec![page(&format!("https://{}", query), "c")])
    });

    let mut config = DelveConfig::default();
    config.research.concurrency = 2;

    let result = research_with_config(&config, chat, search.clone())
        .run_research("topic", 4, 1)
        .await
        .unwrap();

    assert_eq!(result.learnings.len(), 4);
    assert!(search.peak_in_flight() <= 2);
    assert!(search.peak_in_flight() >= 1);
}
