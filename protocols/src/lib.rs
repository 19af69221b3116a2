//! Wire codecs for the probes exposr sends: DNS queries and SNMP GETs.

pub mod dns;
pub mod snmp;
