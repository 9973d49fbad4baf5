//! Owner trust and TOFU policy resolution.

use crate::model::{KeyMaterialState, TofuPolicy, TrustContribution, TrustLevel, TrustSource};

/// Resolve the trust a signature contributes.
///
/// Precedence, highest first:
/// 1. TOFU `Bad` forces `Never`, whatever the stored owner trust.
/// 2. Explicit owner trust (`Never`, `Marginal`, `Full`, `Ultimate`) is used as is.
/// 3. Without explicit owner trust, TOFU `Good` counts as `Marginal`.
/// 4. Otherwise the contribution is `Unknown`.
pub fn evaluate(state: &KeyMaterialState, tofu: TofuPolicy) -> TrustContribution {
    if tofu == TofuPolicy::Bad {
        return TrustContribution {
            level: TrustLevel::Never,
            source: TrustSource::Tofu,
        };
    }

    let owner = state.owner_trust;
    if owner.is_explicit() {
        return TrustContribution {
            level: owner,
            source: TrustSource::OwnerTrust,
        };
    }

    match tofu {
        TofuPolicy::Good => TrustContribution {
            level: TrustLevel::Marginal,
            source: TrustSource::Tofu,
        },
        // Auto, Ask and Unknown do not vouch for the key.
        TofuPolicy::Auto | TofuPolicy::Ask | TofuPolicy::Unknown | TofuPolicy::Bad => {
            TrustContribution {
                level: TrustLevel::Unknown,
                source: TrustSource::None,
            }
        }
    }
}
