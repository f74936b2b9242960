//! Readiness: may this queued job be handed out now?

use tracing::warn;

use crate::domain::{JobRecord, JobType};
use crate::error::{QueueError, Result};
use crate::ports::JobStore;

/// True iff every dependency exists and has finished.
///
/// Finished is the only gate: a dependency that was canceled and then
/// finished still counts. A dependency that is missing from the store or
/// cannot be read makes the job not ready instead of failing the caller, so
/// one bad file never blocks the other jobs of a type.
pub async fn is_ready(record: &JobRecord, store: &dyn JobStore) -> Result<bool> {
    for &dependency in &record.dependencies {
        match store.read(dependency).await {
            Ok(dep) if dep.is_finished() => continue,
            Ok(_) => return Ok(false),
            Err(QueueError::NotFound(_)) => {
                warn!(job = %record.id, %dependency, "dependency missing from store");
                return Ok(false);
            }
            Err(e @ QueueError::CorruptRecord { .. }) => {
                warn!(job = %record.id, %dependency, error = %e, "dependency unreadable");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// True iff the job's type is one of `types`. An empty set matches nothing.
pub fn matches_types(record: &JobRecord, types: &[JobType]) -> bool {
    types.contains(&record.job_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobId;
    use crate::impls::InMemoryJobStore;
    use chrono::Utc;
    use rstest::rstest;
    use ulid::Ulid;

    fn record(job_type: &str, dependencies: Vec<JobId>) -> JobRecord {
        JobRecord::new(
            JobId::from_ulid(Ulid::new()),
            JobType::new(job_type),
            serde_json::Value::Null,
            dependencies,
            Utc::now(),
        )
    }

    async fn finished(store: &InMemoryJobStore) -> JobRecord {
        let mut job = record("test", vec![]);
        job.start(Utc::now()).unwrap();
        job.finish(Utc::now(), serde_json::Value::Null).unwrap();
        store.create(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn no_dependencies_is_ready() {
        let store = InMemoryJobStore::new();
        assert!(is_ready(&record("test", vec![]), &store).await.unwrap());
    }

    #[tokio::test]
    async fn ready_once_all_dependencies_finished() {
        let store = InMemoryJobStore::new();
        let one = finished(&store).await;
        let two = record("test", vec![]);
        store.create(&two).await.unwrap();

        let job = record("test", vec![one.id, two.id]);
        assert!(!is_ready(&job, &store).await.unwrap());

        store.update(two.id, &|r| r.start(Utc::now())).await.unwrap();
        assert!(!is_ready(&job, &store).await.unwrap());

        store
            .update(two.id, &|r| r.finish(Utc::now(), serde_json::Value::Null))
            .await
            .unwrap();
        assert!(is_ready(&job, &store).await.unwrap());
    }

    #[tokio::test]
    async fn canceled_but_finished_dependency_counts() {
        let store = InMemoryJobStore::new();
        let dep = record("test", vec![]);
        store.create(&dep).await.unwrap();
        store.update(dep.id, &|r| r.start(Utc::now())).await.unwrap();
        store
            .update(dep.id, &|r| {
                r.cancel();
                Ok(())
            })
            .await
            .unwrap();
        store
            .update(dep.id, &|r| r.finish(Utc::now(), serde_json::Value::Null))
            .await
            .unwrap();

        let job = record("test", vec![dep.id]);
        assert!(is_ready(&job, &store).await.unwrap());
    }

    #[tokio::test]
    async fn missing_dependency_is_not_ready() {
        let store = InMemoryJobStore::new();
        let ghost = JobId::from_ulid(Ulid::new());
        let job = record("test", vec![ghost]);
        assert!(!is_ready(&job, &store).await.unwrap());
    }

    #[tokio::test]
    async fn unreadable_dependency_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::impls::FsJobStore::open(dir.path()).unwrap();
        let broken = JobId::from_ulid(Ulid::new());
        std::fs::write(dir.path().join(format!("{broken}.json")), "{ truncated").unwrap();

        let job = record("test", vec![broken]);
        assert!(!is_ready(&job, &store).await.unwrap());
    }

    #[rstest]
    #[case::member(&["fish", "octopus"], true)]
    #[case::not_member(&["clownfish"], false)]
    #[case::empty(&[], false)]
    fn type_matching(#[case] types: &[&str], #[case] expected: bool) {
        let types: Vec<JobType> = types.iter().map(|t| JobType::new(*t)).collect();
        assert_eq!(matches_types(&record("octopus", vec![]), &types), expected);
    }
}
