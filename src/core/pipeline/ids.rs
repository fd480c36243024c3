pub use ulid::Ulid;

/// Source of the time-sortable identifier embedded in container name
/// prefixes. Production uses the system clock; tests inject a fixed
/// value so two compilations of the same input compare byte-identical.
pub trait RunIdSource: Send + Sync {
    fn next(&self) -> Ulid;
}

/// Clock-backed identifier source.
#[derive(Debug, Default)]
pub struct SystemRunIds;

impl RunIdSource for SystemRunIds {
    fn next(&self) -> Ulid {
        Ulid::new()
    }
}

/// Fixed identifier source for deterministic tests.
#[derive(Debug)]
pub struct FixedRunIds(pub Ulid);

impl RunIdSource for FixedRunIds {
    fn next(&self) -> Ulid {
        self.0
    }
}
