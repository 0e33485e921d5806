//! Boot-time configuration.
//!
//! Pool sizes are fixed once the kernel boots. Defaults come from
//! `param.rs`; a TOML document may override any of them:
//!
//! ```toml
//! [bcache]
//! nbuf = 30
//! nbucket = 17
//!
//! [kmem]
//! ncpu = 8
//! pages = 1024
//! junk_on_alloc = true
//! junk_on_free = true
//! ```

use crate::{
    arch::mem::PAGE_SIZE,
    error::{Error, Result},
    param::{NBUCKET, NBUF, NCPU, NPAGES},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub bcache: BcacheConfig,
    pub kmem: KmemConfig,
}

impl KernelConfig {
    #[inline]
    pub fn bcache(mut self, bcache: BcacheConfig) -> Self {
        self.bcache = bcache;
        self
    }

    #[inline]
    pub fn kmem(mut self, kmem: KmemConfig) -> Self {
        self.kmem = kmem;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(src: &str) -> Result<Self> {
        let config: KernelConfig = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bcache.validate()?;
        self.kmem.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BcacheConfig {
    /// Number of buffer slots.
    pub nbuf: usize,
    /// Number of hash buckets the slots are spread over.
    pub nbucket: usize,
}

impl Default for BcacheConfig {
    fn default() -> Self {
        BcacheConfig {
            nbuf: NBUF,
            nbucket: NBUCKET,
        }
    }
}

impl BcacheConfig {
    #[inline]
    pub fn nbuf(mut self, nbuf: usize) -> Self {
        self.nbuf = nbuf;
        self
    }

    #[inline]
    pub fn nbucket(mut self, nbucket: usize) -> Self {
        self.nbucket = nbucket;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.nbuf == 0 {
            return Err(Error::InvalidConfig("bcache.nbuf must be at least 1".into()));
        }
        if self.nbucket == 0 {
            return Err(Error::InvalidConfig(
                "bcache.nbucket must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KmemConfig {
    /// Number of per-CPU free lists.
    pub ncpu: usize,
    /// Pages of physical memory managed by the allocator.
    pub pages: usize,
    /// Fill pages with `JUNK_ON_ALLOC` when handed out.
    pub junk_on_alloc: bool,
    /// Fill pages with `JUNK_ON_FREE` when returned.
    pub junk_on_free: bool,
}

impl Default for KmemConfig {
    fn default() -> Self {
        KmemConfig {
            ncpu: NCPU,
            pages: NPAGES,
            junk_on_alloc: cfg!(feature = "junk-fill"),
            junk_on_free: cfg!(feature = "junk-fill"),
        }
    }
}

impl KmemConfig {
    #[inline]
    pub fn ncpu(mut self, ncpu: usize) -> Self {
        self.ncpu = ncpu;
        self
    }

    #[inline]
    pub fn pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    #[inline]
    pub fn junk_on_alloc(mut self, junk_on_alloc: bool) -> Self {
        self.junk_on_alloc = junk_on_alloc;
        self
    }

    #[inline]
    pub fn junk_on_free(mut self, junk_on_free: bool) -> Self {
        self.junk_on_free = junk_on_free;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ncpu == 0 || self.ncpu > NCPU {
            return Err(Error::InvalidConfig(format!(
                "kmem.ncpu must be in 1..={}, got {}",
                NCPU, self.ncpu
            )));
        }
        if self.pages == 0 {
            return Err(Error::InvalidConfig("kmem.pages must be at least 1".into()));
        }
        if self
            .pages
            .checked_mul(PAGE_SIZE)
            .map_or(true, |size| size > isize::MAX as usize)
        {
            return Err(Error::InvalidConfig(format!(
                "kmem.pages {} exceeds the address space",
                self.pages
            )));
        }
        Ok(())
    }
}
