//! Height and previous local exit root of the next certificate.

use crate::{CertificateInfo, HeightError, StorageError};
use aggsender_agglayer::CertificateStatus;
use alloy_primitives::{b256, B256};

/// Local exit root of an empty exit tree, the previous root of height 0.
pub const ZERO_LER: B256 =
    b256!("0x27ae5ba08d7291c96c8cbddcc148bf48a6d68c7974b94356f53754ef6171d757");

/// Resolves the height and previous local exit root of the certificate that
/// follows `last_sent`.
///
/// A settled certificate is followed by the next height. A certificate in
/// error is retried at its own height, chaining from the same root it chained
/// from. `certificate_by_height` is consulted only when that root was not
/// recorded with the failed certificate.
pub fn next_height_and_previous_ler<F>(
    last_sent: Option<&CertificateInfo>,
    certificate_by_height: F,
) -> Result<(u64, B256), HeightError>
where
    F: FnOnce(u64) -> Result<Option<CertificateInfo>, StorageError>,
{
    let Some(last_sent) = last_sent else {
        return Ok((0, ZERO_LER));
    };

    match last_sent.status {
        CertificateStatus::Pending => Err(HeightError::LastCertificateNotClosed {
            height: last_sent.height,
            status: last_sent.status,
        }),
        CertificateStatus::Settled => Ok((last_sent.height + 1, last_sent.new_local_exit_root)),
        CertificateStatus::InError => {
            if let Some(previous_ler) = last_sent.previous_local_exit_root {
                return Ok((last_sent.height, previous_ler));
            }
            if last_sent.height == 0 {
                return Ok((0, ZERO_LER));
            }

            let previous_height = last_sent.height - 1;
            let previous = certificate_by_height(previous_height)?
                .ok_or(HeightError::PreviousNotFound(previous_height))?;
            if !previous.status.is_settled() {
                return Err(HeightError::PreviousNotSettled {
                    height: previous_height,
                    status: previous.status,
                });
            }
            Ok((last_sent.height, previous.new_local_exit_root))
        }
    }
}
