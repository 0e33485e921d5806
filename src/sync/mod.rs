use std::fmt;

pub mod sleeplock;
pub mod spinlock;
pub mod spinmutex;

/// Acquisition counters of one spinlock or a group of them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LockStats {
    pub name: &'static str,
    /// Successful acquisitions.
    pub acquires: u64,
    /// Failed test-and-set attempts while waiting.
    pub contended: u64,
}
impl LockStats {
    /// Fold the counters of several locks under one name.
    pub fn sum(name: &'static str, stats: impl IntoIterator<Item = LockStats>) -> LockStats {
        stats.into_iter().fold(
            LockStats {
                name,
                ..LockStats::default()
            },
            |acc, s| LockStats {
                name,
                acquires: acc.acquires + s.acquires,
                contended: acc.contended + s.contended,
            },
        )
    }
}
impl fmt::Display for LockStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock: {}: #test-and-set {} #acquire() {}",
            self.name, self.contended, self.acquires
        )
    }
}
