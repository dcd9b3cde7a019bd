//! Report scope: the optional zone/cluster/host filter of a report request.

use crate::backend::ReadReportDataRequest;

/// Scope parsed from the `zone`, `cluster` and `host` query parameters.
///
/// An empty string means "not given". Other query parameters are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportScope {
    pub zone: String,
    pub cluster: String,
    pub host: String,
}

impl ReportScope {
    /// Build a scope from decoded query pairs. A repeated key keeps its first
    /// value.
    pub fn from_query<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let (mut zone, mut cluster, mut host) = (None, None, None);
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "zone" => &mut zone,
                "cluster" => &mut cluster,
                "host" => &mut host,
                _ => continue,
            };
            slot.get_or_insert(value);
        }

        Self {
            zone: zone.unwrap_or_default(),
            cluster: cluster.unwrap_or_default(),
            host: host.unwrap_or_default(),
        }
    }

    /// Backend filter carrying only the populated scope fields.
    pub fn filter(&self) -> ReadReportDataRequest {
        ReadReportDataRequest {
            zone: populated(&self.zone),
            cluster: populated(&self.cluster),
            host: populated(&self.host),
        }
    }
}

fn populated(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}
