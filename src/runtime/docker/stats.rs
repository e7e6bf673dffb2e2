// Pull the server memory figure out of a raw Docker stats response.

use bollard::models::ContainerStatsResponse;

/// Memory usage in bytes, or None when the sample carries no memory section
/// (first sample of a stopped container, or a read before the cgroup is populated).
pub(crate) fn memory_usage(s: &ContainerStatsResponse) -> Option<u64> {
    s.memory_stats.as_ref().and_then(|m| m.usage)
}
