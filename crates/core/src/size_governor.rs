//! Keeps certificates under the configured size ceiling by certifying fewer blocks.

use crate::{BuildError, CertificateBuildParams};
use tracing::{debug, warn};

/// Narrows `params` one block at a time from the end of its range until the
/// estimated size fits in `max_size`. A `max_size` of 0 disables the limit.
///
/// A single block is never split, so it is returned even when oversized. Once
/// narrowing drops every bridge the previous, larger range is kept instead.
pub fn limit_certificate_size(
    params: CertificateBuildParams,
    max_size: u64,
) -> Result<CertificateBuildParams, BuildError> {
    let mut current = params;
    let mut previous: Option<CertificateBuildParams> = None;
    loop {
        if current.bridges.is_empty() {
            return Ok(match previous {
                Some(previous) => {
                    warn!(
                        target: "aggsender",
                        size = previous.estimated_size(),
                        max_size,
                        "reached the minimum range holding bridges, certificate is over the max size"
                    );
                    previous
                }
                None => current,
            });
        }

        let size = current.estimated_size();
        if max_size == 0 || size <= max_size {
            return Ok(current);
        }

        if current.number_of_blocks() <= 1 {
            warn!(
                target: "aggsender",
                from_block = current.from_block,
                to_block = current.to_block,
                size,
                max_size,
                "reached the minimum number of blocks, certificate is over the max size"
            );
            return Ok(current);
        }

        debug!(target: "aggsender", size, max_size, to_block = current.to_block, "narrowing certificate range");
        let narrowed = current.range(current.from_block, current.to_block - 1)?;
        previous = Some(std::mem::replace(&mut current, narrowed));
    }
}
