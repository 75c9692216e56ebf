// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Running the AXFR server in the background until the expected zones
//! have been transferred.
//!
//! [`start`] binds the listener, starts the server and a monitor task,
//! and returns a [`TransferHandle`]. The monitor drains the completion
//! channel that connection tasks report finished transfers on. When it
//! stops (according to the [`CompletionPolicy`]), the handle's
//! [`wait`](TransferHandle::wait) methods shut the server down and
//! return a [`TransferReport`].
//!
//! [`bootstrap`] adds the step in between: registering each zone as a
//! slave with the provider, so that the provider's nameservers come and
//! fetch it.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;

use crate::io::{ShutdownController, TokioIoProvider};
use crate::name::Name;
use crate::rr::RecordSet;
use crate::server::{Server, ServerSettings, ZoneError};
use crate::util::Caseless;

////////////////////////////////////////////////////////////////////////
// SETTINGS                                                           //
////////////////////////////////////////////////////////////////////////

/// When the monitor stops waiting for transfers.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CompletionPolicy {
    /// Stop once every expected zone has been transferred at least
    /// once.
    #[default]
    AllDomainsSeen,

    /// Keep draining completions until the server goes away. A caller
    /// using this policy needs [`TransferHandle::wait_for`] (or some
    /// other deadline) to ever stop.
    DrainForever,
}

impl CompletionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllDomainsSeen => "all-domains-seen",
            Self::DrainForever => "drain-forever",
        }
    }
}

impl FromStr for CompletionPolicy {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        [Self::AllDomainsSeen, Self::DrainForever]
            .into_iter()
            .find(|policy| Caseless(policy.as_str()) == Caseless(text))
            .ok_or("expected \"all-domains-seen\" or \"drain-forever\"")
    }
}

impl fmt::Display for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for [`start`] and [`bootstrap`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferSettings {
    /// The address to listen on.
    pub bind: SocketAddr,

    pub server: ServerSettings,

    pub completion: CompletionPolicy,

    /// How long [`bootstrap`] waits for transfers. `None` waits as long
    /// as the [`CompletionPolicy`] does.
    pub timeout: Option<Duration>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 53),
            server: ServerSettings::default(),
            completion: CompletionPolicy::default(),
            timeout: None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// STARTING AND WAITING                                               //
////////////////////////////////////////////////////////////////////////

/// Starts serving `domains` from `records` in the background.
///
/// This binds the listener and spawns the server and monitor tasks on
/// the active Tokio runtime, then returns without waiting for any
/// transfer.
pub async fn start<'a, I>(
    settings: &TransferSettings,
    domains: I,
    records: &RecordSet,
) -> Result<TransferHandle, TransferError>
where
    I: IntoIterator<Item = &'a Name>,
{
    let server = Arc::new(Server::new(&settings.server, domains, records)?);
    let provider = TokioIoProvider::bind(settings.bind)
        .await
        .map_err(|source| TransferError::Bind {
            addr: settings.bind,
            source,
        })?;
    let local_addr = provider
        .local_addr()
        .map_err(|source| TransferError::Bind {
            addr: settings.bind,
            source,
        })?;

    let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
    let shutdown = provider.start(&server, completion_sender);
    let expected: Vec<Name> = server.domains().cloned().collect();
    info!("serving AXFR on {local_addr} for {}", DisplayDomains(&expected));

    let (stop_sender, stop_receiver) = oneshot::channel();
    let (report_sender, report_receiver) = oneshot::channel();
    tokio::spawn(monitor(
        completion_receiver,
        stop_receiver,
        settings.completion,
        TransferReport::new(expected.clone()),
        report_sender,
    ));

    Ok(TransferHandle {
        local_addr,
        expected,
        shutdown,
        stop: stop_sender,
        report: report_receiver,
    })
}

/// Drains completions until `policy` says to stop, the server goes
/// away, or a stop is requested, then sends the report.
async fn monitor(
    mut completions: mpsc::UnboundedReceiver<Name>,
    mut stop: oneshot::Receiver<()>,
    policy: CompletionPolicy,
    mut report: TransferReport,
    report_sender: oneshot::Sender<TransferReport>,
) {
    if policy == CompletionPolicy::AllDomainsSeen && report.is_complete() {
        debug!("no zones are expected; not waiting for transfers");
        let _ = report_sender.send(report);
        return;
    }
    loop {
        let domain = tokio::select! {
            _ = &mut stop => break,
            received = completions.recv() => match received {
                Some(domain) => domain,
                None => break,
            },
        };
        report.completions.push(domain);
        info!(
            "completed transfers: {} (expected {})",
            DisplayDomains(&report.seen()),
            DisplayDomains(&report.expected),
        );
        if policy == CompletionPolicy::AllDomainsSeen && report.is_complete() {
            debug!("every expected zone has been transferred");
            break;
        }
    }
    let _ = report_sender.send(report);
}

/// A handle to a server started by [`start`].
///
/// Dropping the handle shuts the server down without waiting.
pub struct TransferHandle {
    local_addr: SocketAddr,
    expected: Vec<Name>,
    shutdown: ShutdownController,
    stop: oneshot::Sender<()>,
    report: oneshot::Receiver<TransferReport>,
}

impl TransferHandle {
    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits until the monitor stops, then shuts the server down
    /// gracefully. There is no deadline; see
    /// [`TransferHandle::wait_for`].
    pub async fn wait(self) -> TransferReport {
        let report = self
            .report
            .await
            .unwrap_or_else(|_| TransferReport::new(self.expected));
        self.shutdown.shut_down().await;
        report
    }

    /// Like [`TransferHandle::wait`], but stops waiting after `limit`.
    /// The report then tells which zones were not transferred.
    pub async fn wait_for(mut self, limit: Duration) -> TransferReport {
        let report = match tokio::time::timeout(limit, &mut self.report).await {
            Ok(report) => report,
            Err(_) => {
                warn!("stopped waiting for transfers after {:?}", limit);
                let _ = self.stop.send(());
                self.report.await
            }
        };
        let report = report.unwrap_or_else(|_| TransferReport::new(self.expected));
        self.shutdown.shut_down().await;
        report
    }

    /// The blocking variant of [`TransferHandle::wait`]. This must not
    /// be called from within the runtime the server runs on.
    pub fn blocking_wait(self) -> TransferReport {
        let report = self
            .report
            .blocking_recv()
            .unwrap_or_else(|_| TransferReport::new(self.expected));
        self.shutdown.blocking_shut_down();
        report
    }

    /// Shuts the server down without waiting for transfers.
    pub async fn shut_down(self) {
        let _ = self.stop.send(());
        self.shutdown.shut_down().await;
    }
}

/// The outcome of waiting on a [`TransferHandle`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferReport {
    expected: Vec<Name>,
    completions: Vec<Name>,
}

impl TransferReport {
    fn new(expected: Vec<Name>) -> Self {
        Self {
            expected,
            completions: Vec::new(),
        }
    }

    /// Returns the zones the server was started for.
    pub fn expected(&self) -> &[Name] {
        &self.expected
    }

    /// Returns every completed transfer, in the order they finished. A
    /// zone transferred more than once appears more than once.
    pub fn completions(&self) -> &[Name] {
        &self.completions
    }

    /// Returns the distinct zones that were transferred.
    pub fn seen(&self) -> Vec<Name> {
        let mut seen = HashSet::new();
        self.completions
            .iter()
            .filter(|domain| seen.insert(*domain))
            .cloned()
            .collect()
    }

    /// Returns the expected zones that were never transferred.
    pub fn missing(&self) -> Vec<Name> {
        let seen: HashSet<&Name> = self.completions.iter().collect();
        self.expected
            .iter()
            .filter(|domain| !seen.contains(domain))
            .cloned()
            .collect()
    }

    /// Returns whether every expected zone was transferred.
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Formats a list of zones for logging.
struct DisplayDomains<'a>(&'a [Name]);

impl fmt::Display for DisplayDomains<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("{")?;
        for (i, domain) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", domain)?;
        }
        f.write_str("}")
    }
}

////////////////////////////////////////////////////////////////////////
// BOOTSTRAPPING SLAVE ZONES                                          //
////////////////////////////////////////////////////////////////////////

/// Registers zones as slave zones with a DNS provider.
pub trait SlaveRegistrar {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Registers `domain` as a slave zone whose master is `master`.
    fn register_slave(&mut self, domain: &Name, master: IpAddr) -> Result<(), Self::Error>;
}

/// Starts the server, registers every zone as a slave with `registrar`
/// so that the provider pulls it from `master` (the public address of
/// this host), and then waits for the transfers.
///
/// Registration is synchronous, so it runs on Tokio's blocking thread
/// pool. If a registration fails, the server is shut down and the error
/// is returned.
pub async fn bootstrap<R>(
    settings: &TransferSettings,
    domains: &[Name],
    records: &RecordSet,
    mut registrar: R,
    master: IpAddr,
) -> Result<TransferReport, TransferError>
where
    R: SlaveRegistrar + Send + 'static,
{
    let handle = start(settings, domains, records).await?;

    let to_register = domains.to_vec();
    let registered = tokio::task::spawn_blocking(move || {
        for domain in to_register {
            info!("registering {domain} as a slave zone with master {master}");
            registrar
                .register_slave(&domain, master)
                .map_err(|source| TransferError::Registration {
                    domain: domain.clone(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    })
    .await;

    match registered {
        Ok(Ok(())) => (),
        Ok(Err(err)) => {
            handle.shut_down().await;
            return Err(err);
        }
        Err(join_error) => {
            handle.shut_down().await;
            return Err(cancelled_or_resume(join_error));
        }
    }

    Ok(match settings.timeout {
        Some(limit) => handle.wait_for(limit).await,
        None => handle.wait().await,
    })
}

/// Resumes the panic of the registration task, or reports that it was
/// cancelled (which happens when the runtime shuts down).
fn cancelled_or_resume(join_error: JoinError) -> TransferError {
    if join_error.is_panic() {
        std::panic::resume_unwind(join_error.into_panic());
    }
    TransferError::RegistrationCancelled
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that transfers could not be run.
#[derive(Debug)]
pub enum TransferError {
    /// The zones could not be built.
    Zone(ZoneError),

    /// The listener could not be bound.
    Bind { addr: SocketAddr, source: io::Error },

    /// Registering a slave zone failed.
    Registration {
        domain: Name,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Registration was cancelled before it finished.
    RegistrationCancelled,
}

impl From<ZoneError> for TransferError {
    fn from(err: ZoneError) -> Self {
        Self::Zone(err)
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Zone(_) => f.write_str("failed to prepare zones for transfer"),
            Self::Bind { addr, .. } => write!(f, "failed to listen on {}", addr),
            Self::Registration { domain, .. } => {
                write!(f, "failed to register {} as a slave zone", domain)
            }
            Self::RegistrationCancelled => f.write_str("slave zone registration was cancelled"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Zone(err) => Some(err),
            Self::Bind { source, .. } => Some(source),
            Self::Registration { source, .. } => Some(source.as_ref()),
            Self::RegistrationCancelled => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use tokio::net::TcpStream;

    use super::*;
    use crate::io::framing::{self, FrameError};
    use crate::message::Qtype;
    use crate::rr::{Rdata, Record, Type};
    use crate::server::tests::{query, read_answers};

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    fn local_settings(completion: CompletionPolicy) -> TransferSettings {
        TransferSettings {
            bind: "127.0.0.1:0".parse().unwrap(),
            completion,
            ..Default::default()
        }
    }

    fn a_records(domains: &[Name]) -> RecordSet {
        domains
            .iter()
            .enumerate()
            .map(|(i, domain)| {
                let data = Rdata::Text(format!("10.0.0.{}", i + 1));
                Record::new(domain.to_string(), 300, Type::A, data).unwrap()
            })
            .collect()
    }

    async fn fetch(addr: SocketAddr, qname: &str, qtype: Qtype) -> Result<Vec<u8>, FrameError> {
        let mut stream = TcpStream::connect(addr).await?;
        framing::write_message(&mut stream, &query(7, qname, qtype)).await?;
        framing::read_message(&mut stream).await
    }

    #[tokio::test]
    async fn transfer_completes_and_stops_the_monitor() {
        let domains = [name("example.com.")];
        let handle = start(
            &local_settings(CompletionPolicy::AllDomainsSeen),
            &domains,
            &a_records(&domains),
        )
        .await
        .unwrap();

        let response = fetch(handle.local_addr(), "example.com.", Qtype::AXFR)
            .await
            .unwrap();
        let types: Vec<u16> = read_answers(&response).iter().map(|rr| rr.rr_type).collect();
        assert_eq!(types, [6, 2, 2, 2, 2, 1, 6]);

        let report = handle.wait().await;
        assert!(report.is_complete());
        assert_eq!(report.completions(), &domains);
    }

    #[tokio::test]
    async fn declined_requests_get_no_response_and_no_completion() {
        let domains = [name("example.com.")];
        let handle = start(
            &local_settings(CompletionPolicy::AllDomainsSeen),
            &domains,
            &a_records(&domains),
        )
        .await
        .unwrap();
        let addr = handle.local_addr();

        for (qname, qtype) in [
            ("example.org.", Qtype::AXFR),
            ("example.com.", Qtype::from(1)),
            ("example.com.", Qtype::IXFR),
        ] {
            assert!(matches!(
                fetch(addr, qname, qtype).await,
                Err(FrameError::TruncatedMessage {
                    expected: 2,
                    received: 0
                })
            ));
        }

        let report = handle.wait_for(Duration::from_millis(200)).await;
        assert!(report.completions().is_empty());
        assert_eq!(report.missing(), domains);
    }

    #[tokio::test]
    async fn concurrent_transfers_all_complete() {
        let domains: Vec<Name> = (0..8).map(|i| name(&format!("zone{}.test.", i))).collect();
        let handle = start(
            &local_settings(CompletionPolicy::AllDomainsSeen),
            &domains,
            &a_records(&domains),
        )
        .await
        .unwrap();
        let addr = handle.local_addr();

        let clients: Vec<_> = domains
            .iter()
            .map(|domain| {
                let qname = domain.to_string();
                tokio::spawn(async move { fetch(addr, &qname, Qtype::AXFR).await })
            })
            .collect();
        for (i, client) in clients.into_iter().enumerate() {
            let response = client.await.unwrap().unwrap();
            let answers = read_answers(&response);
            assert_eq!(answers.len(), 7);
            assert_eq!(answers[5].owner, domains[i]);
            assert_eq!(answers[5].rdata, &[10, 0, 0, i as u8 + 1]);
        }

        let report = handle.wait().await;
        assert_eq!(report.completions().len(), domains.len());
        assert!(report.is_complete());
        let seen: HashSet<Name> = report.seen().into_iter().collect();
        assert_eq!(seen, domains.iter().cloned().collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn drain_forever_keeps_counting_past_completeness() {
        let domains = [name("example.com.")];
        let handle = start(
            &local_settings(CompletionPolicy::DrainForever),
            &domains,
            &a_records(&domains),
        )
        .await
        .unwrap();
        let addr = handle.local_addr();

        fetch(addr, "example.com.", Qtype::AXFR).await.unwrap();
        fetch(addr, "EXAMPLE.COM.", Qtype::AXFR).await.unwrap();

        let report = handle.wait_for(Duration::from_millis(300)).await;
        assert!(report.is_complete());
        assert_eq!(report.completions().len(), 2);
        assert_eq!(report.seen(), domains);
    }

    #[tokio::test]
    async fn nothing_expected_means_nothing_to_wait_for() {
        let handle = start(
            &local_settings(CompletionPolicy::AllDomainsSeen),
            &[] as &[Name],
            &RecordSet::new(),
        )
        .await
        .unwrap();
        let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("wait should return at once");
        assert!(report.is_complete());
        assert!(report.completions().is_empty());
    }

    #[tokio::test]
    async fn cancelled_registrations_are_errors() {
        let task = tokio::spawn(std::future::pending::<()>());
        task.abort();
        let join_error = task.await.unwrap_err();
        assert!(matches!(
            cancelled_or_resume(join_error),
            TransferError::RegistrationCancelled
        ));
    }

    #[test]
    fn completion_policies_parse() {
        assert_eq!(
            "all-domains-seen".parse(),
            Ok(CompletionPolicy::AllDomainsSeen)
        );
        assert_eq!("Drain-Forever".parse(), Ok(CompletionPolicy::DrainForever));
        assert!("sometimes".parse::<CompletionPolicy>().is_err());
        assert_eq!(CompletionPolicy::default(), CompletionPolicy::AllDomainsSeen);
    }

    /// A registrar that, like a provider's secondary, transfers each
    /// zone as soon as it is registered.
    struct PullingRegistrar {
        addr: SocketAddr,
        fail_on: Option<Name>,
    }

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("refused")
        }
    }

    impl std::error::Error for Refused {}

    impl SlaveRegistrar for PullingRegistrar {
        type Error = Refused;

        fn register_slave(&mut self, domain: &Name, master: IpAddr) -> Result<(), Refused> {
            assert_eq!(master, IpAddr::V4(Ipv4Addr::LOCALHOST));
            if self.fail_on.as_ref() == Some(domain) {
                return Err(Refused);
            }
            let mut stream = std::net::TcpStream::connect(self.addr).unwrap();
            let request =
                framing::encode_frame(&query(1, &domain.to_string(), Qtype::AXFR)).unwrap();
            stream.write_all(&request).unwrap();
            let mut length = [0; 2];
            stream.read_exact(&mut length).unwrap();
            let mut response = vec![0; u16::from_be_bytes(length) as usize];
            stream.read_exact(&mut response).unwrap();
            assert_eq!(read_answers(&response).len(), 7);
            Ok(())
        }
    }

    /// Reserves a free local port for a test server.
    fn free_local_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn bootstrap_registers_and_waits_for_every_zone() {
        let domains = [name("a.test."), name("b.test.")];
        let mut settings = local_settings(CompletionPolicy::AllDomainsSeen);
        settings.bind = free_local_addr();
        settings.timeout = Some(Duration::from_secs(10));
        let registrar = PullingRegistrar {
            addr: settings.bind,
            fail_on: None,
        };
        let report = bootstrap(
            &settings,
            &domains,
            &a_records(&domains),
            registrar,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )
        .await
        .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.completions().len(), 2);
    }

    #[tokio::test]
    async fn bootstrap_reports_registration_failures() {
        let domains = [name("a.test."), name("b.test.")];
        let mut settings = local_settings(CompletionPolicy::AllDomainsSeen);
        settings.bind = free_local_addr();
        let registrar = PullingRegistrar {
            addr: settings.bind,
            fail_on: Some(name("b.test.")),
        };
        match bootstrap(
            &settings,
            &domains,
            &a_records(&domains),
            registrar,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )
        .await
        {
            Err(TransferError::Registration { domain, .. }) => assert_eq!(domain, domains[1]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn blocking_wait_works_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let domains = [name("example.com.")];
        let handle = runtime
            .block_on(start(
                &local_settings(CompletionPolicy::AllDomainsSeen),
                &domains,
                &a_records(&domains),
            ))
            .unwrap();
        let addr = handle.local_addr();
        runtime
            .block_on(fetch(addr, "example.com.", Qtype::AXFR))
            .unwrap();
        let report = handle.blocking_wait();
        assert!(report.is_complete());
    }
}
