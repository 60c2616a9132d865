// src/defaults.rs

use std::time::Duration;

// Queue Constants
pub const QUEUE_SLOTS: usize = 128;
pub const COMBINE_WORKERS: usize = 1;
pub const JOB_THROTTLE_MS: u64 = 1000;
pub const JOB_THROTTLE: Duration = Duration::from_millis(JOB_THROTTLE_MS);

// Process Constants
pub const SHELL: &str = "sh";
/// How often a running command checks the abort signal. Only bounds how
/// quickly an in-flight job is killed after an abort; normal exits are seen
/// on the next poll as well.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

// Merge Constants
pub const COPY_CHUNK_SIZE: usize = 1 << 20; // 1 MiB

// LASTZ Constants
pub const LASTZ_BINARY: &str = "lastz";
pub const STRAND: &str = "both";
pub const OUTPUT_FORMAT: &str = "sam";
pub const TABULAR_FIELDS: &str = ":score,name1,strand1,size1,start1,zstart1,end1,length1,text1,name2,strand2,size2,start2,zstart2,end2,start2+,zstart2+,end2+,length2,text2,diff,cigar,identity,coverage,gaprate,diagonal,shingle";

// Other Constants
pub const VERBOSITY: i32 = 3;
pub const TEMP_PREFIX: &str = "ferrous-lastz-";
