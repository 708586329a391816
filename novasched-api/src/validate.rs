use std::collections::HashSet;

use novasched_domain::{Error, SchedulingRequest};

/// Every listed host must carry a weight, and every weight key must name a
/// listed host — an inconsistent request is rejected before it ever reaches
/// a pipeline.
pub fn validate_request(request: &SchedulingRequest) -> Result<(), Error> {
    let known_hosts: HashSet<&str> = request.hosts.iter().map(|h| h.compute_host.as_str()).collect();

    for host in &request.hosts {
        if !request.weights.contains_key(&host.compute_host) {
            return Err(Error::MalformedInput(format!("host {:?} has no entry in weights", host.compute_host)));
        }
    }
    for key in request.weights.keys() {
        if !known_hosts.contains(key.as_str()) {
            return Err(Error::MalformedInput(format!("weight key {key:?} is not a known host")));
        }
    }
    Ok(())
}
