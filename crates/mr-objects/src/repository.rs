use std::marker::PhantomData;
use std::sync::Arc;

use chrono::SecondsFormat;
use mr_container::{Catcher, RepoMetadata, RetryPolicy, Writer};
use mr_lock::{LockConfig, LockManager};
use mr_store::ObjectBackend;
use mr_types::{
    link_names, names_match, Clock, Company, ContainerName, ContainerObject, Interaction, LinkMap,
    Sha, Study, SystemClock,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{RepositoryError, RepositoryResult};
use crate::policy::{Cascade, TypePolicy};

/// Every object of a container plus the SHA it was read at.
#[derive(Clone, Debug)]
pub struct Listing<T> {
    pub objects: Vec<T>,
    pub sha: Option<Sha>,
    /// Records that could not be decoded as `T`, by name or `#index`.
    pub skipped: Vec<String>,
}

/// What a delete removed or rewrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: String,
    /// Linked records deleted along with it.
    pub cascaded: Vec<String>,
    /// Records whose link maps no longer mention it.
    pub unlinked: Vec<(ContainerName, String)>,
}

/// Shared construction parameters for the per-type repositories.
#[derive(Clone)]
pub struct Repositories {
    backend: Arc<dyn ObjectBackend>,
    locks: LockConfig,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Repositories {
    pub fn new(backend: Arc<dyn ObjectBackend>, locks: LockConfig, retry: RetryPolicy) -> Self {
        Self::with_clock(backend, locks, retry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn ObjectBackend>,
        locks: LockConfig,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            locks,
            retry,
            clock,
        }
    }

    pub fn repository<T: ContainerObject>(&self) -> ContainerRepository<T> {
        ContainerRepository::new(
            self.backend.clone(),
            self.locks.clone(),
            self.retry,
            self.clock.clone(),
        )
    }

    pub fn companies(&self) -> ContainerRepository<Company> {
        self.repository()
    }

    pub fn interactions(&self) -> ContainerRepository<Interaction> {
        self.repository()
    }

    pub fn studies(&self) -> ContainerRepository<Study> {
        self.repository()
    }

    /// A lock manager for inspecting or clearing locks directly.
    pub fn lock_manager(&self) -> LockManager {
        LockManager::with_clock(self.backend.clone(), self.locks.clone(), self.clock.clone())
    }

    pub fn backend(&self) -> &Arc<dyn ObjectBackend> {
        &self.backend
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories")
            .field("backend", &self.backend.describe())
            .field("locks", &self.locks)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Typed access to one container.
///
/// Reads go straight to the store. Every mutation is one session: catch the
/// containers it touches, merge and write, then release whatever happens.
pub struct ContainerRepository<T> {
    catcher: Catcher,
    writer: Writer,
    policy: TypePolicy,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ContainerObject> ContainerRepository<T> {
    pub fn new(
        backend: Arc<dyn ObjectBackend>,
        locks: LockConfig,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let catcher = Catcher::with_clock(backend, locks, clock.clone());
        let writer = Writer::for_catcher(&catcher, retry);
        Self {
            catcher,
            writer,
            policy: TypePolicy::for_container(T::CONTAINER),
            clock,
            _marker: PhantomData,
        }
    }

    /// Replace the stock policy; its container must be `T::CONTAINER`.
    pub fn with_policy(mut self, policy: TypePolicy) -> Self {
        debug_assert_eq!(policy.container, T::CONTAINER);
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &TypePolicy {
        &self.policy
    }

    pub fn container(&self) -> ContainerName {
        T::CONTAINER
    }

    /// Read every object without locking.
    pub async fn get_all(&self) -> RepositoryResult<Listing<T>> {
        let snapshot = self.catcher.read_container(T::CONTAINER).await?;
        let (objects, skipped) = decode_all::<T>(snapshot.objects);
        Ok(Listing {
            objects,
            sha: snapshot.sha,
            skipped,
        })
    }

    pub async fn find_by_name(&self, name: &str) -> RepositoryResult<Vec<T>> {
        let found: Vec<T> = self
            .get_all()
            .await?
            .objects
            .into_iter()
            .filter(|object| names_match(object.name(), name))
            .collect();
        if found.is_empty() {
            return Err(self.not_found(name));
        }
        Ok(found)
    }

    /// Objects whose `attribute` equals `value`; strings compare without case.
    pub async fn find_by_x(&self, attribute: &str, value: &Value) -> RepositoryResult<Vec<T>> {
        let snapshot = self.catcher.read_container(T::CONTAINER).await?;
        let matching: Vec<Value> = snapshot
            .objects
            .into_iter()
            .filter(|object| {
                object
                    .get(attribute)
                    .is_some_and(|field| value_matches(field, value))
            })
            .collect();
        let (found, _) = decode_all::<T>(matching);
        if found.is_empty() {
            return Err(self.not_found(&format!("{attribute}={value}")));
        }
        Ok(found)
    }

    /// Append `objs` to the container. Returns the new container SHA.
    pub async fn create_objs(&self, objs: Vec<T>) -> RepositoryResult<Sha> {
        if objs.iter().any(|o| o.name().trim().is_empty()) {
            return Err(RepositoryError::EmptyName(T::CONTAINER));
        }
        let now = self.timestamp();
        let additions = objs
            .iter()
            .map(|o| to_value(o).map(|v| stamp_created(v, &now)))
            .collect::<RepositoryResult<Vec<_>>>()?;
        let message = format!("Create {} {} object(s)", additions.len(), T::CONTAINER);

        let mut meta = self
            .catcher
            .catch(RepoMetadata::for_containers([T::CONTAINER]))
            .await?;
        let outcome = self
            .writer
            .apply(&mut meta, T::CONTAINER, &message, |mut existing| {
                existing.extend(additions.iter().cloned());
                Ok::<_, RepositoryError>(existing)
            })
            .await;
        let sha = self.catcher.finish(meta, outcome).await?;
        info!(container = %T::CONTAINER, count = additions.len(), "objects created");
        Ok(sha)
    }

    /// Assign `updates` to the object called `name` and return it.
    ///
    /// Every key must be whitelisted; nothing is locked otherwise.
    pub async fn update_obj(&self, name: &str, updates: Map<String, Value>) -> RepositoryResult<T> {
        if let Some(field) = updates.keys().find(|k| !self.policy.allows(k)) {
            return Err(RepositoryError::FieldNotWhitelisted {
                container: T::CONTAINER,
                field: field.clone(),
            });
        }
        if updates.is_empty() {
            return Err(RepositoryError::InvalidValue("no fields to update".into()));
        }
        let now = self.timestamp();
        let message = format!("Update {} {name}", T::CONTAINER);

        let mut meta = self
            .catcher
            .catch(RepoMetadata::for_containers([T::CONTAINER]))
            .await?;
        let mut updated: Option<T> = None;
        let outcome = self
            .writer
            .apply(&mut meta, T::CONTAINER, &message, |mut objects| {
                let index = objects
                    .iter()
                    .position(|o| object_name(o).is_some_and(|n| names_match(n, name)))
                    .ok_or_else(|| self.not_found(name))?;
                let Value::Object(fields) = &mut objects[index] else {
                    return Err(RepositoryError::Serialization(format!("{name} is not an object")));
                };
                for (key, value) in &updates {
                    fields.insert(key.clone(), value.clone());
                }
                fields.insert("modification_date".into(), Value::String(now.clone()));
                let record = serde_json::from_value::<T>(Value::Object(fields.clone()))
                    .map_err(|e| RepositoryError::InvalidValue(e.to_string()))?;
                // Store updated keys in their typed form, e.g. `94105` as "94105".
                let typed = to_value(&record)?;
                for key in updates.keys() {
                    if let Some(value) = typed.get(key) {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                updated = Some(record);
                Ok(objects)
            })
            .await;
        let outcome = outcome.and_then(|_| updated.ok_or_else(|| self.not_found(name)));
        let record = self.catcher.finish(meta, outcome).await?;
        info!(container = %T::CONTAINER, name = record.name(), "object updated");
        Ok(record)
    }

    /// Delete the object called `name` and apply the type's cascade.
    ///
    /// With `allow_orphans` only the object's own container is touched and
    /// links to it elsewhere are left dangling.
    pub async fn delete_obj(&self, name: &str, allow_orphans: bool) -> RepositoryResult<DeleteReport> {
        let cascade = if allow_orphans {
            Cascade::None
        } else {
            self.policy.cascade
        };
        let mut containers = vec![T::CONTAINER];
        if !allow_orphans {
            containers.extend_from_slice(self.policy.cascade_targets());
        }

        let mut meta = self
            .catcher
            .catch(RepoMetadata::for_containers(containers))
            .await?;
        let outcome = self.delete_in(&mut meta, name, cascade).await;
        self.catcher.finish(meta, outcome).await
    }

    async fn delete_in(
        &self,
        meta: &mut RepoMetadata,
        name: &str,
        cascade: Cascade,
    ) -> RepositoryResult<DeleteReport> {
        let primary = meta
            .objects(T::CONTAINER)
            .iter()
            .find(|o| object_name(o).is_some_and(|n| names_match(n, name)))
            .cloned()
            .ok_or_else(|| self.not_found(name))?;
        let record: T = decode(primary)?;
        let deleted = record.name().to_string();

        let message = format!("Delete {} {deleted}", T::CONTAINER);
        self.writer
            .apply(meta, T::CONTAINER, &message, |objects| {
                Ok::<_, RepositoryError>(without_named(objects, &[deleted.as_str()]))
            })
            .await?;
        info!(container = %T::CONTAINER, name = %deleted, "object deleted");

        let mut report = DeleteReport {
            deleted: deleted.clone(),
            ..DeleteReport::default()
        };
        match cascade {
            Cascade::None => {}
            Cascade::DeleteLinked(target) => {
                let linked: Vec<String> = record
                    .links(target)
                    .map(|links| links.keys().cloned().collect())
                    .unwrap_or_default();
                report.cascaded = self.delete_linked(meta, target, &deleted, &linked).await?;
            }
            Cascade::Unlink(targets) => {
                let mut failed = Vec::new();
                for &target in targets {
                    match self.unlink(meta, target, &deleted).await {
                        Ok(touched) => report
                            .unlinked
                            .extend(touched.into_iter().map(|n| (target, n))),
                        Err(referrers) => failed.extend(referrers),
                    }
                }
                if !failed.is_empty() {
                    return Err(RepositoryError::OrphanRisk { deleted, failed });
                }
            }
        }
        Ok(report)
    }

    async fn delete_linked(
        &self,
        meta: &mut RepoMetadata,
        target: ContainerName,
        deleted: &str,
        linked: &[String],
    ) -> RepositoryResult<Vec<String>> {
        let wanted: Vec<&str> = linked.iter().map(String::as_str).collect();
        let present: Vec<String> = meta
            .objects(target)
            .iter()
            .filter_map(object_name)
            .filter(|n| wanted.iter().any(|w| names_match(n, w)))
            .map(str::to_string)
            .collect();
        if present.is_empty() {
            debug!(%target, deleted, "no linked objects to delete");
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        let message = format!("Delete {target} linked to {deleted}");
        let result = self
            .writer
            .apply(meta, target, &message, |objects| {
                removed = objects
                    .iter()
                    .filter_map(object_name)
                    .filter(|n| wanted.iter().any(|w| names_match(n, w)))
                    .map(str::to_string)
                    .collect();
                Ok::<_, RepositoryError>(without_named(objects, &wanted))
            })
            .await;

        match result {
            Ok(_) => {
                info!(%target, deleted, count = removed.len(), "linked objects deleted");
                Ok(removed)
            }
            Err(e) => {
                warn!(%target, deleted, error = %e, "cascade delete failed");
                let failed = if removed.is_empty() { present } else { removed };
                Err(RepositoryError::OrphanRisk {
                    deleted: deleted.to_string(),
                    failed,
                })
            }
        }
    }

    /// Drop `deleted` from every link map in `target` that mentions it.
    ///
    /// On failure returns the names of the records still referencing it.
    async fn unlink(
        &self,
        meta: &mut RepoMetadata,
        target: ContainerName,
        deleted: &str,
    ) -> Result<Vec<String>, Vec<String>> {
        let field = T::CONTAINER.link_field();
        let referrers: Vec<String> = meta
            .objects(target)
            .iter()
            .filter(|o| links_to(o, field, deleted))
            .filter_map(object_name)
            .map(str::to_string)
            .collect();
        if referrers.is_empty() {
            return Ok(Vec::new());
        }

        let mut touched = Vec::new();
        let message = format!("Unlink {deleted} from {target}");
        let result = self
            .writer
            .apply(meta, target, &message, |mut objects| {
                touched.clear();
                for object in objects.iter_mut() {
                    if remove_link(object, field, deleted) {
                        touched.extend(object_name(object).map(str::to_string));
                    }
                }
                Ok::<_, RepositoryError>(objects)
            })
            .await;

        match result {
            Ok(_) => {
                debug!(%target, deleted, count = touched.len(), "links removed");
                Ok(touched)
            }
            Err(e) => {
                warn!(%target, deleted, error = %e, "unlink failed");
                Err(referrers)
            }
        }
    }

    /// `{ name: sha256(name) }` for each object, for use in `linked_*` fields.
    pub fn link_objs(&self, objs: &[T]) -> LinkMap {
        link_names(objs.iter().map(|o| o.name()))
    }

    fn timestamp(&self) -> String {
        self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn not_found(&self, query: &str) -> RepositoryError {
        RepositoryError::NotFound {
            container: T::CONTAINER,
            query: query.to_string(),
        }
    }
}

impl<T> std::fmt::Debug for ContainerRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRepository")
            .field("policy", &self.policy)
            .field("catcher", &self.catcher)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> RepositoryResult<T> {
    serde_json::from_value(value).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

/// Decode every record that fits `T`; the rest are logged and named.
fn decode_all<T: ContainerObject>(objects: Vec<Value>) -> (Vec<T>, Vec<String>) {
    let mut decoded = Vec::with_capacity(objects.len());
    let mut skipped = Vec::new();
    for (index, object) in objects.into_iter().enumerate() {
        let label = object_name(&object).map_or_else(|| format!("#{index}"), str::to_string);
        match serde_json::from_value::<T>(object) {
            Ok(record) => decoded.push(record),
            Err(e) => {
                warn!(container = %T::CONTAINER, record = %label, error = %e, "skipping undecodable record");
                skipped.push(label);
            }
        }
    }
    (decoded, skipped)
}

fn to_value<T: ContainerObject>(object: &T) -> RepositoryResult<Value> {
    serde_json::to_value(object).map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn object_name(object: &Value) -> Option<&str> {
    object.get("name").and_then(Value::as_str)
}

fn stamp_created(mut object: Value, now: &str) -> Value {
    if let Value::Object(fields) = &mut object {
        for key in ["creation_date", "modification_date"] {
            let empty = fields
                .get(key)
                .map_or(true, |v| v.is_null() || v.as_str() == Some(""));
            if empty {
                fields.insert(key.to_string(), Value::String(now.to_string()));
            }
        }
    }
    object
}

fn without_named(objects: Vec<Value>, names: &[&str]) -> Vec<Value> {
    objects
        .into_iter()
        .filter(|o| !object_name(o).is_some_and(|n| names.iter().any(|w| names_match(n, w))))
        .collect()
}

fn links_to(object: &Value, field: &str, name: &str) -> bool {
    object
        .get(field)
        .and_then(Value::as_object)
        .is_some_and(|links| links.keys().any(|k| names_match(k, name)))
}

fn remove_link(object: &mut Value, field: &str, name: &str) -> bool {
    let Some(links) = object.get_mut(field).and_then(Value::as_object_mut) else {
        return false;
    };
    let keys: Vec<String> = links
        .keys()
        .filter(|k| names_match(k, name))
        .cloned()
        .collect();
    for key in &keys {
        links.remove(key);
    }
    !keys.is_empty()
}

/// Strings match case-insensitively, and against the text of a number or
/// boolean. Everything else needs JSON equality.
fn value_matches(field: &Value, wanted: &Value) -> bool {
    match (field, wanted) {
        (Value::String(a), Value::String(b)) => names_match(a, b),
        (Value::String(text), other) | (other, Value::String(text))
            if other.is_number() || other.is_boolean() =>
        {
            text.trim() == other.to_string()
        }
        _ => field == wanted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use mr_container::ContainerError;
    use mr_store::{DirEntry, FileBlob, InMemoryBackend, StoreError, StoreResult, WriteReceipt};
    use mr_types::{BranchRef, ManualClock};
    use proptest::prelude::*;
    use serde_json::json;

    fn repositories(backend: Arc<dyn ObjectBackend>) -> (Repositories, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let repos = Repositories::with_clock(
            backend,
            LockConfig::default(),
            RetryPolicy::default(),
            clock.clone(),
        );
        (repos, clock)
    }

    fn lock_files(backend: &InMemoryBackend) -> Vec<String> {
        backend
            .paths("main")
            .into_iter()
            .filter(|p| p.ends_with(".lock"))
            .collect()
    }

    fn stored_names(backend: &InMemoryBackend, container: ContainerName) -> Vec<String> {
        let Some(content) = backend.content("main", &container.data_path()) else {
            return Vec::new();
        };
        let objects: Vec<Value> = serde_json::from_slice(&content).unwrap();
        objects
            .iter()
            .filter_map(object_name)
            .map(str::to_string)
            .collect()
    }

    /// Seeds Acme linked to two calls, a study linking one call, and an
    /// unrelated interaction.
    async fn seed_linked(repos: &Repositories) {
        repos
            .interactions()
            .create_objs(vec![
                Interaction::named("Call 1"),
                Interaction::named("Call 2"),
                Interaction::named("Webinar"),
            ])
            .await
            .unwrap();
        let mut acme = Company::named("Acme");
        acme.linked_interactions = link_names(["Call 1", "Call 2"]);
        repos.companies().create_objs(vec![acme]).await.unwrap();
        let mut study = Study::named("Q3 Review");
        study.linked_interactions = link_names(["call 1", "Webinar"]);
        repos.studies().create_objs(vec![study]).await.unwrap();
    }

    #[tokio::test]
    async fn create_find_delete_roundtrip() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        let companies = repos.companies();

        companies
            .create_objs(vec![Company::named("Acme"), Company::named("Globex")])
            .await
            .unwrap();
        let found = companies.find_by_name("ACME").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Acme");

        let report = companies.delete_obj("acme", false).await.unwrap();
        assert_eq!(report.deleted, "Acme");
        assert!(matches!(
            companies.find_by_name("Acme").await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert_eq!(companies.get_all().await.unwrap().objects.len(), 1);
        assert!(lock_files(&backend).is_empty());
    }

    #[tokio::test]
    async fn create_appends_and_stamps_dates() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, clock) = repositories(backend.clone());
        let studies = repos.studies();

        studies.create_objs(vec![Study::named("Q3")]).await.unwrap();
        clock.advance(Duration::hours(1));
        let mut kept = Study::named("Q3");
        kept.creation_date = "2020-01-01T00:00:00Z".into();
        studies.create_objs(vec![kept]).await.unwrap();

        // Duplicate names are allowed; creation order is kept.
        let all = studies.get_all().await.unwrap().objects;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].creation_date, "2024-05-01T12:00:00.000Z");
        assert_eq!(all[1].creation_date, "2020-01-01T00:00:00Z");
        assert_eq!(all[1].modification_date, "2024-05-01T13:00:00.000Z");
    }

    #[tokio::test]
    async fn create_rejects_empty_names() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        let err = repos
            .companies()
            .create_objs(vec![Company::named("  ")])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::EmptyName(ContainerName::Companies)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(backend.commit_count("main"), 0);
    }

    #[tokio::test]
    async fn find_by_x_matches_loosely() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend);
        let companies = repos.companies();
        let mut acme = Company::named("Acme");
        acme.city = "Boston".into();
        acme.cik = "12345".into();
        let mut globex = Company::named("Globex");
        globex.city = "Springfield".into();
        companies.create_objs(vec![acme, globex]).await.unwrap();

        let found = companies.find_by_x("city", &json!("boston")).await.unwrap();
        assert_eq!(found[0].name, "Acme");
        let found = companies.find_by_x("cik", &json!(12345)).await.unwrap();
        assert_eq!(found[0].name, "Acme");
        assert!(matches!(
            companies.find_by_x("city", &json!("Paris")).await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_applies_whitelisted_fields() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, clock) = repositories(backend);
        let companies = repos.companies();
        companies.create_objs(vec![Company::named("Acme")]).await.unwrap();
        clock.advance(Duration::minutes(30));

        let mut updates = Map::new();
        updates.insert("description".into(), json!("Anvils"));
        updates.insert("latitude".into(), json!(42.36));
        let updated = companies.update_obj("acme", updates).await.unwrap();
        assert_eq!(updated.description, "Anvils");
        assert_eq!(updated.modification_date, "2024-05-01T12:30:00.000Z");

        let stored = companies.find_by_name("Acme").await.unwrap().remove(0);
        assert_eq!(stored.description, "Anvils");
        assert_eq!(stored.creation_date, "2024-05-01T12:00:00.000Z");
    }

    #[tokio::test]
    async fn update_rejects_fields_before_locking() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        let companies = repos.companies();
        companies.create_objs(vec![Company::named("Acme")]).await.unwrap();
        let commits = backend.commit_count("main");

        let mut updates = Map::new();
        updates.insert("description".into(), json!("ok"));
        updates.insert("name".into(), json!("Renamed"));
        let err = companies.update_obj("Acme", updates).await.unwrap_err();
        match &err {
            RepositoryError::FieldNotWhitelisted { field, .. } => assert_eq!(field, "name"),
            other => panic!("expected whitelist rejection, got {other}"),
        }
        assert_eq!(err.status_code(), 400);
        assert_eq!(backend.commit_count("main"), commits);
    }

    #[tokio::test]
    async fn update_of_missing_object_releases_locks() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        let mut updates = Map::new();
        updates.insert("status".into(), json!("closed"));
        let err = repos.studies().update_obj("Nope", updates).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(lock_files(&backend).is_empty());
    }

    #[tokio::test]
    async fn update_with_wrong_type_is_rejected() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        let companies = repos.companies();
        companies.create_objs(vec![Company::named("Acme")]).await.unwrap();
        let before = backend.content("main", "Companies/Companies.json").unwrap();

        let mut updates = Map::new();
        updates.insert("city".into(), json!({"not": "a string"}));
        let err = companies.update_obj("Acme", updates).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidValue(_)));
        assert_eq!(backend.content("main", "Companies/Companies.json").unwrap(), before);
    }

    #[tokio::test]
    async fn update_stores_numeric_text_as_string() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        let companies = repos.companies();
        companies.create_objs(vec![Company::named("Acme")]).await.unwrap();

        let mut updates = Map::new();
        updates.insert("zip_postal".into(), json!(94105));
        updates.insert("cik".into(), json!(320193));
        let updated = companies.update_obj("Acme", updates).await.unwrap();
        assert_eq!(updated.zip_postal, "94105");

        let content = backend.content("main", "Companies/Companies.json").unwrap();
        let stored: Vec<Value> = serde_json::from_slice(&content).unwrap();
        assert_eq!(stored[0]["zip_postal"], json!("94105"));
        assert_eq!(stored[0]["cik"], json!("320193"));
    }

    #[tokio::test]
    async fn listing_tolerates_foreign_records() {
        let backend = Arc::new(InMemoryBackend::new());
        let raw = json!([
            {"name": "Acme", "description": null, "linked_studies": null},
            {"name": "Initech", "city": ["not", "text"]},
            {"name": "Globex"}
        ]);
        backend.seed(
            "main",
            "Companies/Companies.json",
            raw.to_string().as_bytes(),
            Sha::new("abc").unwrap(),
        );
        let (repos, _) = repositories(backend);
        let companies = repos.companies();

        let listing = companies.get_all().await.unwrap();
        let names: Vec<&str> = listing.objects.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Globex"]);
        assert_eq!(listing.skipped, vec!["Initech"]);
        assert_eq!(listing.objects[0].description, "");

        assert_eq!(companies.find_by_name("globex").await.unwrap()[0].name, "Globex");
        assert!(matches!(
            companies.find_by_name("Initech").await,
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn company_delete_cascades_to_interactions() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        seed_linked(&repos).await;

        let report = repos.companies().delete_obj("Acme", false).await.unwrap();
        assert_eq!(report.cascaded, vec!["Call 1", "Call 2"]);
        assert!(stored_names(&backend, ContainerName::Companies).is_empty());
        assert_eq!(stored_names(&backend, ContainerName::Interactions), vec!["Webinar"]);
        assert!(lock_files(&backend).is_empty());
    }

    #[tokio::test]
    async fn allow_orphans_leaves_interactions() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        seed_linked(&repos).await;

        let report = repos.companies().delete_obj("Acme", true).await.unwrap();
        assert!(report.cascaded.is_empty());
        assert!(stored_names(&backend, ContainerName::Companies).is_empty());
        assert_eq!(
            stored_names(&backend, ContainerName::Interactions),
            vec!["Call 1", "Call 2", "Webinar"]
        );
    }

    #[tokio::test]
    async fn interaction_delete_unlinks_referrers() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        seed_linked(&repos).await;

        let report = repos.interactions().delete_obj("Call 1", false).await.unwrap();
        assert_eq!(
            report.unlinked,
            vec![
                (ContainerName::Companies, "Acme".to_string()),
                (ContainerName::Studies, "Q3 Review".to_string()),
            ]
        );
        let acme = repos.companies().find_by_name("Acme").await.unwrap().remove(0);
        assert_eq!(acme.linked_interactions.keys().collect::<Vec<_>>(), vec!["Call 2"]);
        let study = repos.studies().find_by_name("Q3 Review").await.unwrap().remove(0);
        assert_eq!(study.linked_interactions.keys().collect::<Vec<_>>(), vec!["Webinar"]);
    }

    /// Fails every write to one path.
    struct FailingWrites {
        inner: Arc<InMemoryBackend>,
        fail_path: String,
    }

    #[async_trait]
    impl ObjectBackend for FailingWrites {
        fn describe(&self) -> String {
            "failing-writes".into()
        }
        async fn branch_head(&self, branch: &str) -> StoreResult<BranchRef> {
            self.inner.branch_head(branch).await
        }
        async fn read_file(&self, branch: &str, path: &str) -> StoreResult<Option<FileBlob>> {
            self.inner.read_file(branch, path).await
        }
        async fn write_file(
            &self,
            branch: &str,
            path: &str,
            content: &[u8],
            expected: Option<&Sha>,
            message: &str,
        ) -> StoreResult<WriteReceipt> {
            if path == self.fail_path {
                return Err(StoreError::PermissionDenied("protected file".into()));
            }
            self.inner.write_file(branch, path, content, expected, message).await
        }
        async fn delete_file(&self, branch: &str, path: &str, sha: &Sha, message: &str) -> StoreResult<()> {
            self.inner.delete_file(branch, path, sha, message).await
        }
        async fn list_dir(&self, branch: &str, dir: &str) -> StoreResult<Vec<DirEntry>> {
            self.inner.list_dir(branch, dir).await
        }
    }

    #[tokio::test]
    async fn failed_cascade_reports_orphans() {
        let inner = Arc::new(InMemoryBackend::new());
        let (seeder, _) = repositories(inner.clone());
        seed_linked(&seeder).await;

        let (repos, _) = repositories(Arc::new(FailingWrites {
            inner: inner.clone(),
            fail_path: "Interactions/Interactions.json".into(),
        }));
        let err = repos.companies().delete_obj("Acme", false).await.unwrap_err();
        match &err {
            RepositoryError::OrphanRisk { deleted, failed } => {
                assert_eq!(deleted, "Acme");
                assert_eq!(failed, &vec!["Call 1".to_string(), "Call 2".to_string()]);
            }
            other => panic!("expected orphan risk, got {other}"),
        }
        assert_eq!(err.status_code(), 207);
        assert!(stored_names(&inner, ContainerName::Companies).is_empty());
        assert!(lock_files(&inner).is_empty());
    }

    #[tokio::test]
    async fn orphan_report_names_only_stored_records() {
        let inner = Arc::new(InMemoryBackend::new());
        let (seeder, _) = repositories(inner.clone());
        seeder
            .interactions()
            .create_objs(vec![Interaction::named("Call 1"), Interaction::named("Webinar")])
            .await
            .unwrap();
        let mut acme = Company::named("Acme");
        acme.linked_interactions = link_names(["Call 1", "Deleted Long Ago"]);
        seeder.companies().create_objs(vec![acme]).await.unwrap();

        let (repos, _) = repositories(Arc::new(FailingWrites {
            inner: inner.clone(),
            fail_path: "Interactions/Interactions.json".into(),
        }));
        match repos.companies().delete_obj("Acme", false).await.unwrap_err() {
            RepositoryError::OrphanRisk { failed, .. } => assert_eq!(failed, vec!["Call 1"]),
            other => panic!("expected orphan risk, got {other}"),
        }
        assert_eq!(
            stored_names(&inner, ContainerName::Interactions),
            vec!["Call 1", "Webinar"]
        );
    }

    #[tokio::test]
    async fn contention_surfaces_as_423() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend.clone());
        let holder = repos.lock_manager();
        let lock = holder.lock_container(ContainerName::Companies).await.unwrap();

        let err = repos
            .companies()
            .create_objs(vec![Company::named("Acme")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Container(ContainerError::LockContention { .. })
        ));
        assert_eq!(err.status_code(), 423);
        holder.unlock_container(&lock).await.unwrap();
    }

    #[test]
    fn link_objs_hashes_names() {
        let backend = Arc::new(InMemoryBackend::new());
        let (repos, _) = repositories(backend);
        let links = repos
            .companies()
            .link_objs(&[Company::named("Acme"), Company::named("Globex")]);
        assert_eq!(links.len(), 2);
        assert_eq!(links["Acme"], mr_types::link_hash("Acme"));
    }

    proptest! {
        #[test]
        fn string_values_match_any_case(s in "[a-zA-Z0-9 ]{0,24}") {
            prop_assert!(value_matches(&json!(s.to_uppercase()), &json!(s.to_lowercase())));
        }

        #[test]
        fn numbers_match_their_text(n in any::<i64>()) {
            prop_assert!(value_matches(&json!(n.to_string()), &json!(n)));
            prop_assert!(value_matches(&json!(n), &json!(n)));
        }
    }
}
