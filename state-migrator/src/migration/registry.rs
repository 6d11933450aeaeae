use std::sync::Arc;

use crate::migration::error::{MigrationError, MigrationResult};
use crate::migration::migrator::Migrator;

/// An ordered, gap-free chain of migrators, built once and handed to the runner.
///
/// History is strictly linear, so resolving a path between two versions is a slice of
/// the chain.
#[derive(Clone, Default)]
pub struct MigratorRegistry {
    migrators: Vec<Arc<dyn Migrator>>,
}

impl MigratorRegistry {
    /// Validates and orders `migrators`.
    ///
    /// # Errors
    /// - `MigrationError::InvalidRegistry` if a migrator does not advance exactly one
    ///   version or two migrators share a source version
    /// - `MigrationError::UnknownMigratorVersion` if the chain has a gap; the missing
    ///   source version is reported
    pub fn new(mut migrators: Vec<Arc<dyn Migrator>>) -> MigrationResult<Self> {
        migrators.sort_by_key(|migrator| migrator.from_version());

        for migrator in &migrators {
            if migrator.from_version().checked_add(1) != Some(migrator.to_version()) {
                return Err(MigrationError::InvalidRegistry {
                    message: format!(
                        "{} goes from {} to {}; migrators must advance exactly one version",
                        migrator.name(),
                        migrator.from_version(),
                        migrator.to_version()
                    ),
                });
            }
        }

        for pair in migrators.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            if previous.from_version() == next.from_version() {
                return Err(MigrationError::InvalidRegistry {
                    message: format!(
                        "{} and {} both migrate from version {}",
                        previous.name(),
                        next.name(),
                        next.from_version()
                    ),
                });
            }
            if previous.to_version() != next.from_version() {
                return Err(MigrationError::UnknownMigratorVersion {
                    version: previous.to_version(),
                });
            }
        }

        Ok(Self { migrators })
    }

    /// Number of migrators in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrators.len()
    }

    /// Whether the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrators.is_empty()
    }

    /// The oldest version the chain can upgrade from; 0 for an empty registry
    #[must_use]
    pub fn min_version(&self) -> u32 {
        self.migrators
            .first()
            .map_or(0, |migrator| migrator.from_version())
    }

    /// The version the chain ends at; 0 for an empty registry
    #[must_use]
    pub fn latest_version(&self) -> u32 {
        self.migrators
            .last()
            .map_or(0, |migrator| migrator.to_version())
    }

    /// Fails unless `version` lies on the chain
    ///
    /// # Errors
    /// - `MigrationError::UnknownMigratorVersion` if `version` is below
    ///   [`Self::min_version`] or above [`Self::latest_version`]
    pub fn ensure_supported(&self, version: u32) -> MigrationResult<()> {
        if version < self.min_version() || version > self.latest_version() {
            return Err(MigrationError::UnknownMigratorVersion { version });
        }
        Ok(())
    }

    /// The migrators that take a store at `version` forward to `target`, in order.
    /// Empty when `version >= target` or either end is off the chain.
    #[must_use]
    pub fn forward_path(&self, version: u32, target: u32) -> &[Arc<dyn Migrator>] {
        let (Some(start), Some(end)) = (self.index_of(version), self.index_of(target)) else {
            return &[];
        };
        if start >= end {
            return &[];
        }
        &self.migrators[start..end]
    }

    /// The migrator whose target is `version`, i.e. the one to roll back from it
    #[must_use]
    pub fn ending_at(&self, version: u32) -> Option<&Arc<dyn Migrator>> {
        let index = self.index_of(version)?.checked_sub(1)?;
        self.migrators.get(index)
    }

    /// Position of `version` on the chain: migrator `i` goes from position `i` to `i + 1`
    fn index_of(&self, version: u32) -> Option<usize> {
        if version < self.min_version() || version > self.latest_version() {
            return None;
        }
        usize::try_from(version - self.min_version()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::helper::MigrationHelper;
    use crate::migration::migrator::StepOutcome;
    use async_trait::async_trait;

    struct StubMigrator {
        from: u32,
        to: u32,
    }

    #[async_trait]
    impl Migrator for StubMigrator {
        fn from_version(&self) -> u32 {
            self.from
        }

        fn to_version(&self) -> u32 {
            self.to
        }

        async fn migrate(&self, _helper: &MigrationHelper) -> MigrationResult<StepOutcome> {
            Ok(StepOutcome::default())
        }

        async fn rollback(&self, _helper: &MigrationHelper) -> MigrationResult<StepOutcome> {
            Ok(StepOutcome::default())
        }
    }

    fn step(from: u32) -> Arc<dyn Migrator> {
        Arc::new(StubMigrator { from, to: from + 1 })
    }

    fn versions(path: &[Arc<dyn Migrator>]) -> Vec<(u32, u32)> {
        path.iter()
            .map(|migrator| (migrator.from_version(), migrator.to_version()))
            .collect()
    }

    #[test]
    fn test_registry_is_sorted() {
        let registry = MigratorRegistry::new(vec![step(22), step(20), step(21)]).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.min_version(), 20);
        assert_eq!(registry.latest_version(), 23);
        assert_eq!(
            versions(registry.forward_path(20, 23)),
            vec![(20, 21), (21, 22), (22, 23)]
        );
    }

    #[test]
    fn test_gap_is_unknown_version() {
        let result = MigratorRegistry::new(vec![step(20), step(22)]);
        assert!(matches!(
            result,
            Err(MigrationError::UnknownMigratorVersion { version: 21 })
        ));
    }

    #[test]
    fn test_duplicate_source_version_is_rejected() {
        let result = MigratorRegistry::new(vec![step(20), step(20)]);
        assert!(matches!(result, Err(MigrationError::InvalidRegistry { .. })));
    }

    #[test]
    fn test_multi_version_jump_is_rejected() {
        let jump: Arc<dyn Migrator> = Arc::new(StubMigrator { from: 3, to: 5 });
        let result = MigratorRegistry::new(vec![jump]);
        assert!(matches!(result, Err(MigrationError::InvalidRegistry { .. })));
    }

    #[test]
    fn test_partial_forward_path() {
        let registry = MigratorRegistry::new(vec![step(20), step(21), step(22)]).unwrap();

        assert_eq!(versions(registry.forward_path(21, 23)), vec![(21, 22), (22, 23)]);
        assert_eq!(versions(registry.forward_path(20, 21)), vec![(20, 21)]);
        assert!(registry.forward_path(23, 23).is_empty());
        assert!(registry.forward_path(22, 21).is_empty());
        assert!(registry.forward_path(19, 23).is_empty());
    }

    #[test]
    fn test_ending_at() {
        let registry = MigratorRegistry::new(vec![step(20), step(21)]).unwrap();

        let last = registry.ending_at(22).unwrap();
        assert_eq!((last.from_version(), last.to_version()), (21, 22));
        assert!(registry.ending_at(20).is_none());
        assert!(registry.ending_at(23).is_none());
    }

    #[test]
    fn test_supported_range() {
        let registry = MigratorRegistry::new(vec![step(20), step(21)]).unwrap();

        assert!(registry.ensure_supported(20).is_ok());
        assert!(registry.ensure_supported(22).is_ok());
        assert!(matches!(
            registry.ensure_supported(19),
            Err(MigrationError::UnknownMigratorVersion { version: 19 })
        ));
        assert!(matches!(
            registry.ensure_supported(23),
            Err(MigrationError::UnknownMigratorVersion { version: 23 })
        ));
    }

    #[test]
    fn test_empty_registry() {
        let registry = MigratorRegistry::new(Vec::new()).unwrap();

        assert!(registry.is_empty());
        assert_eq!(registry.latest_version(), 0);
        assert!(registry.ensure_supported(0).is_ok());
        assert!(registry.ensure_supported(1).is_err());
    }
}
