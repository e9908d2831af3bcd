#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("unable to enumerate any global-scope network interfaces")]
    NoNetworks,
    #[error("scan aborted")]
    Aborted,
    #[error(transparent)]
    Probe(#[from] mbx_probe::ProbeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum MdnsError {
    #[error(transparent)]
    Daemon(#[from] mdns_sd::Error),
}
