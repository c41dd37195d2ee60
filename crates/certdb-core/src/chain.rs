//! Picking which certificate of a bundle to present for trust.
//!
//! CAs usually ship a hierarchy whose root is either the first or the last
//! entry. Only the two ends of the bundle are compared: if the second entry
//! was issued by the first, the first is the root; otherwise if the
//! second-to-last was issued by the last, the last is the root; otherwise
//! the bundle is treated as an unordered pile and the first entry is shown.
//!
//! This never walks the whole bundle. Multi-root or shuffled bundles can
//! select a non-root, which callers must live with.

use serde::{Deserialize, Serialize};

/// Anything with comparable subject and issuer names.
pub trait NamedCert {
    /// Subject distinguished name
    fn subject_name(&self) -> &str;
    /// Issuer distinguished name
    fn issuer_name(&self) -> &str;
}

impl<T: NamedCert + ?Sized> NamedCert for &T {
    fn subject_name(&self) -> &str {
        (**self).subject_name()
    }

    fn issuer_name(&self) -> &str {
        (**self).issuer_name()
    }
}

/// How the presented certificate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// Only one certificate in the bundle
    Single,
    /// Second entry issued by the first
    RootFirst,
    /// Second-to-last entry issued by the last
    RootLast,
    /// No relation at either end
    Unordered,
}

/// The index to present and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootSelection {
    /// Position in the bundle
    pub index: usize,
    /// Which rule picked it
    pub presentation: Presentation,
}

/// Select the certificate to present from a bundle.
///
/// Returns `None` for an empty bundle.
pub fn select_presented<C: NamedCert>(bundle: &[C]) -> Option<RootSelection> {
    let n = bundle.len();
    match n {
        0 => None,
        1 => Some(RootSelection {
            index: 0,
            presentation: Presentation::Single,
        }),
        _ => {
            let (first, second) = (&bundle[0], &bundle[1]);
            let (second_last, last) = (&bundle[n - 2], &bundle[n - 1]);

            let selection = if second.issuer_name() == first.subject_name() {
                RootSelection {
                    index: 0,
                    presentation: Presentation::RootFirst,
                }
            } else if second_last.issuer_name() == last.subject_name() {
                RootSelection {
                    index: n - 1,
                    presentation: Presentation::RootLast,
                }
            } else {
                RootSelection {
                    index: 0,
                    presentation: Presentation::Unordered,
                }
            };
            Some(selection)
        }
    }
}
