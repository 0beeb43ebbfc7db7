// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Locked, size-capped output file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::info;

use crate::error::{Result, ShardlineError};

/// The destination file of one saving instance.
///
/// Holds an advisory exclusive lock for its whole lifetime, so concurrent
/// jobs aimed at the same path serialize instead of interleaving. When a
/// byte cap is configured, a write that would cross it fails with
/// [`ShardlineError::SizeLimitExceeded`] before touching the file.
pub struct OutputFile {
    file: File,
    written: u64,
    cap: Option<u64>,
}

impl OutputFile {
    /// Opens (or creates) `path`, truncating unless `append` is set, and
    /// takes the advisory lock. Blocks until the lock is granted.
    pub fn create(path: &Path, append: bool, cap: Option<u64>) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(path)?;
        lock_exclusive(&file)?;
        info!("writing {}", path.display());
        Ok(Self {
            file,
            written: 0,
            cap,
        })
    }

    /// Appends one serialized chunk, enforcing the byte cap.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        let total = self.written + bytes.len() as u64;
        if let Some(cap) = self.cap {
            if total > cap {
                return Err(ShardlineError::SizeLimitExceeded(total, cap));
            }
        }
        self.file.write_all(bytes)?;
        self.written = total;
        Ok(())
    }

    /// Flushes and returns the number of bytes written. The lock is
    /// released when the file closes.
    pub fn finish(mut self) -> Result<u64> {
        self.file.flush()?;
        Ok(self.written)
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    // Safety: flock on an owned, open descriptor.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc != 0 {
        return Err(ShardlineError::IoError(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> Result<()> {
    Ok(())
}
