//! Catalog tests: monotonic versioning, placeholder validation, and
//! cache honesty, against containerized Redis and RabbitMQ.

use cache::CacheClient;
use domain_templates::{
    CreateTemplate, InMemoryTemplateRepository, Template, TemplateCatalog, TemplateError,
    TemplateRepository, TemplateResolver, TemplateType, UpdateTemplate,
};
use messaging::{BrokerConfig, Publisher};
use resilience::{BreakerConfig, CircuitBreaker};
use std::collections::BTreeMap;
use std::sync::Arc;
use test_utils::{TestRabbitMq, TestRedis};
use uuid::Uuid;

struct Harness {
    catalog: TemplateCatalog<InMemoryTemplateRepository>,
    resolver: TemplateResolver<InMemoryTemplateRepository>,
    repo: Arc<InMemoryTemplateRepository>,
    cache: CacheClient,
    #[allow(dead_code)]
    redis: TestRedis,
    #[allow(dead_code)]
    broker: TestRabbitMq,
}

async fn harness() -> Harness {
    let redis = TestRedis::new().await;
    let broker = TestRabbitMq::new().await;

    let cache = CacheClient::new(redis.connection());

    let connection = messaging::connect(&BrokerConfig::new(broker.connection_string()))
        .await
        .unwrap();
    let publisher = Arc::new(Publisher::new(&connection).await.unwrap());

    let repo = Arc::new(InMemoryTemplateRepository::new());
    let breaker = CircuitBreaker::new(
        cache.clone(),
        BreakerConfig::new(format!("test-{}", Uuid::new_v4())),
    );

    Harness {
        catalog: TemplateCatalog::new(Arc::clone(&repo), cache.clone(), publisher),
        resolver: TemplateResolver::new(Arc::clone(&repo), cache.clone(), breaker),
        repo,
        cache,
        redis,
        broker,
    }
}

fn create_dto(code: &str) -> CreateTemplate {
    CreateTemplate {
        code: code.to_string(),
        template_type: TemplateType::Email,
        language: "en".to_string(),
        content: BTreeMap::from([
            ("subject".to_string(), "hey {{name}}".to_string()),
            ("body".to_string(), "hi {{name}}".to_string()),
        ]),
        variables: vec!["name".to_string()],
    }
}

#[tokio::test]
#[ignore] // Requires Docker
async fn create_starts_at_version_one() {
    let h = harness().await;
    let code = format!("welcome-{}", Uuid::new_v4());

    let created = h.catalog.create(create_dto(&code)).await.unwrap();
    assert_eq!(created.version, 1);

    // Both cache entries exist and match the row
    let latest: Template = h
        .cache
        .get_json(&format!("template:{}:en:latest", code))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, 1);

    let versioned: Template = h
        .cache
        .get_json(&format!("template:{}:en:1", code))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(versioned.id, created.id);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn create_conflicts_on_existing_code_language() {
    let h = harness().await;
    let code = format!("welcome-{}", Uuid::new_v4());

    h.catalog.create(create_dto(&code)).await.unwrap();

    let replay = h.catalog.create(create_dto(&code)).await;
    assert!(matches!(replay, Err(TemplateError::Conflict { .. })));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn update_appends_the_next_version_and_keeps_history() {
    let h = harness().await;
    let code = format!("welcome-{}", Uuid::new_v4());

    let v1 = h.catalog.create(create_dto(&code)).await.unwrap();

    let v2 = h
        .catalog
        .update(
            &code,
            UpdateTemplate {
                template_type: None,
                language: "en".to_string(),
                content: Some(BTreeMap::from([
                    ("subject".to_string(), "hello {{name}}".to_string()),
                    ("body".to_string(), "hi {{name}}, welcome".to_string()),
                ])),
                variables: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(v2.version, v1.version + 1);
    // Merged fields: type and variables carried over
    assert_eq!(v2.template_type, TemplateType::Email);
    assert_eq!(v2.variables, vec!["name".to_string()]);

    // The prior version is untouched
    let old = h.repo.find(&code, "en", 1).await.unwrap().unwrap();
    assert_eq!(old.content["subject"], "hey {{name}}");

    // Cache-vs-truth: latest now matches the new row
    let latest: Template = h
        .cache
        .get_json(&format!("template:{}:en:latest", code))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.content["subject"], "hello {{name}}");

    // Resolver agrees
    let resolved = h.resolver.resolve(&code, "en", None).await.unwrap();
    assert_eq!(resolved.version, 2);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn versions_stay_contiguous_across_updates() {
    let h = harness().await;
    let code = format!("welcome-{}", Uuid::new_v4());

    h.catalog.create(create_dto(&code)).await.unwrap();

    for _ in 0..4 {
        h.catalog
            .update(
                &code,
                UpdateTemplate {
                    template_type: None,
                    language: "en".to_string(),
                    content: None,
                    variables: None,
                },
            )
            .await
            .unwrap();
    }

    // Versions 1..=5, one row each
    for version in 1..=5 {
        assert!(
            h.repo.find(&code, "en", version).await.unwrap().is_some(),
            "version {} missing",
            version
        );
    }
    assert!(h.repo.find(&code, "en", 6).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn undeclared_placeholder_is_rejected() {
    let h = harness().await;
    let code = format!("welcome-{}", Uuid::new_v4());

    let mut dto = create_dto(&code);
    dto.content.insert(
        "body".to_string(),
        "hi {{name}}, click {{link}}".to_string(),
    );

    let result = h.catalog.create(dto).await;
    assert!(matches!(result, Err(TemplateError::Validation(_))));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn delete_removes_all_versions_and_cache_entries() {
    let h = harness().await;
    let code = format!("welcome-{}", Uuid::new_v4());

    h.catalog.create(create_dto(&code)).await.unwrap();
    h.catalog
        .update(
            &code,
            UpdateTemplate {
                template_type: None,
                language: "en".to_string(),
                content: None,
                variables: None,
            },
        )
        .await
        .unwrap();

    h.catalog.delete(&code, "en").await.unwrap();

    assert!(h.repo.find_latest(&code, "en").await.unwrap().is_none());

    let cached: Option<Template> = h
        .cache
        .get_json(&format!("template:{}:en:latest", code))
        .await
        .unwrap();
    assert!(cached.is_none());

    // Resolving after delete answers NotFound
    let result = h.resolver.resolve(&code, "en", None).await;
    assert!(matches!(result, Err(TemplateError::NotFound { .. })));

    // Deleting again is NotFound, not a silent success
    let again = h.catalog.delete(&code, "en").await;
    assert!(matches!(again, Err(TemplateError::NotFound { .. })));
}
