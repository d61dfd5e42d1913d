use crate::repository::lookup::{LookupError, LookupService};
use futures::future::BoxFuture;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use taproot_proto::packet::header::ResponseCode;
use taproot_proto::packet::question::Question;
use taproot_proto::packet::record::Record;
use taproot_proto::packet::{DnsPacket, QueryType};

/// Referral hops a single walk may follow before giving up.
const MAX_ITERATIONS: usize = 16;
/// Nested glue lookups a walk may stack before giving up.
const MAX_DEPTH: usize = 8;

#[derive(Debug)]
pub struct Config {
    /// Where every walk starts: the root name servers.
    pub roots: Vec<Ipv4Addr>,
    pub max_iterations: usize,
    pub max_depth: usize,
    /// Cap on a whole resolution, glue lookups included.
    pub deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: crate::config::ROOT_SERVERS.to_vec(),
            max_iterations: MAX_ITERATIONS,
            max_depth: MAX_DEPTH,
            deadline: Self::default_deadline(),
        }
    }
}

impl Config {
    fn default_deadline() -> Duration {
        Duration::from_secs(10)
    }

    pub fn new(roots: Vec<Ipv4Addr>) -> Self {
        Self {
            roots,
            ..Default::default()
        }
    }

    pub fn build(self, lookup: Arc<dyn LookupService + Send + Sync>) -> IterativeResolverService {
        IterativeResolverService {
            lookup,
            config: self,
        }
    }
}

#[derive(Debug)]
pub enum ResolveError {
    Lookup(LookupError),
    /// Non-authoritative reply without a single NS record to follow.
    NoReferral,
    /// A referral without glue whose name servers could not be resolved.
    NoNameserverAddress,
    IterationsExhausted,
    DepthExceeded,
    DeadlineExceeded,
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lookup(inner) => write!(f, "upstream lookup failed: {inner}"),
            Self::NoReferral => write!(f, "reply carried neither answer nor referral"),
            Self::NoNameserverAddress => write!(f, "no referred name server could be resolved"),
            Self::IterationsExhausted => write!(f, "referral budget exhausted"),
            Self::DepthExceeded => write!(f, "glue lookup recursion too deep"),
            Self::DeadlineExceeded => write!(f, "resolution deadline exceeded"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<LookupError> for ResolveError {
    fn from(value: LookupError) -> Self {
        Self::Lookup(value)
    }
}

impl ResolveError {
    /// The single code a client sees for any of these failures. Name
    /// errors are not errors here: an authoritative NXDOMAIN comes back
    /// through the `Ok` path with its own response code.
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::ServerFailure
    }
}

#[async_trait::async_trait]
pub trait ResolverService {
    async fn resolve(&self, question: &Question) -> Result<DnsPacket, ResolveError>;
}

/// Walks the DNS hierarchy for each question, starting at the roots and
/// following referrals until some server answers with authority.
pub struct IterativeResolverService {
    lookup: Arc<dyn LookupService + Send + Sync>,
    config: Config,
}

#[async_trait::async_trait]
impl ResolverService for IterativeResolverService {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, question: &Question) -> Result<DnsPacket, ResolveError> {
        match tokio::time::timeout(self.config.deadline, self.walk(question, 0)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::DeadlineExceeded),
        }
    }
}

impl IterativeResolverService {
    /// One full descent from the roots. Recursion only happens for glue
    /// lookups, hence the boxed future and the depth bound.
    fn walk<'a>(
        &'a self,
        question: &'a Question,
        depth: usize,
    ) -> BoxFuture<'a, Result<DnsPacket, ResolveError>> {
        Box::pin(async move {
            if depth > self.config.max_depth {
                return Err(ResolveError::DepthExceeded);
            }

            let mut servers = self.config.roots.clone();
            for iteration in 0..self.config.max_iterations {
                let reply = self.lookup.query(&servers, question).await?;

                if reply.header.response_code == ResponseCode::NameError {
                    tracing::debug!(
                        "{} does not exist, told after {iteration} referrals",
                        question.name
                    );
                    // keep the verdict, drop whatever records came along
                    let mut reply = reply;
                    reply.questions.clear();
                    reply.answers.clear();
                    reply.authorities.clear();
                    reply.resources.clear();
                    return Ok(reply);
                }

                if reply.header.authoritative_answer || !reply.answers.is_empty() {
                    tracing::debug!(
                        "answer for {} found after {iteration} referrals",
                        question.name
                    );
                    return Ok(reply);
                }

                let targets: Vec<&str> = reply
                    .authorities
                    .iter()
                    .filter_map(|record| match record {
                        Record::NS { host, .. } => Some(host.as_str()),
                        _ => None,
                    })
                    .collect();
                if targets.is_empty() {
                    return Err(ResolveError::NoReferral);
                }

                // IPv4 glue for any of the referred name servers. AAAA glue
                // is decoded but never queried.
                let mut next: Vec<Ipv4Addr> = reply
                    .resources
                    .iter()
                    .filter_map(|record| match record {
                        Record::A { domain, addr, .. }
                            if targets
                                .iter()
                                .any(|target| target.eq_ignore_ascii_case(domain)) =>
                        {
                            Some(*addr)
                        }
                        _ => None,
                    })
                    .collect();

                if next.is_empty() {
                    next = self.resolve_nameservers(&targets, depth).await?;
                }

                servers = next;
            }
            Err(ResolveError::IterationsExhausted)
        })
    }

    /// A referral came without glue: resolve the name servers themselves,
    /// in the order the authority section listed them, and settle for the
    /// first one that yields addresses.
    async fn resolve_nameservers(
        &self,
        targets: &[&str],
        depth: usize,
    ) -> Result<Vec<Ipv4Addr>, ResolveError> {
        for target in targets {
            let question = Question::new((*target).to_string(), QueryType::A);
            match self.walk(&question, depth + 1).await {
                Ok(found) => {
                    let addresses: Vec<Ipv4Addr> = found
                        .answers
                        .iter()
                        .filter_map(|record| match record {
                            Record::A { addr, .. } => Some(*addr),
                            _ => None,
                        })
                        .collect();
                    if !addresses.is_empty() {
                        return Ok(addresses);
                    }
                }
                Err(error) => {
                    tracing::debug!("failed to resolve name server {target}: {error}");
                }
            }
        }
        Err(ResolveError::NoNameserverAddress)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ResolveError, ResolverService};
    use crate::repository::lookup::{LookupError, MockLookupService};
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use taproot_proto::packet::header::{Header, ResponseCode};
    use taproot_proto::packet::question::Question;
    use taproot_proto::packet::record::Record;
    use taproot_proto::packet::{DnsPacket, QueryType};

    fn roots() -> Vec<Ipv4Addr> {
        vec![Ipv4Addr::new(198, 41, 0, 4)]
    }

    fn echo(qname: &str) -> Question {
        Question::new(qname.into(), QueryType::A)
    }

    fn referral(qname: &str, zone: &str, ns: &str, glue: Option<Ipv4Addr>) -> DnsPacket {
        let packet = DnsPacket::new(Header::response(0))
            .with_question(echo(qname))
            .with_authority(Record::NS {
                domain: zone.into(),
                host: ns.into(),
                ttl: 172800,
            });
        match glue {
            Some(addr) => packet.with_resource(Record::A {
                domain: ns.into(),
                addr,
                ttl: 172800,
            }),
            None => packet,
        }
    }

    fn authoritative(qname: &str, addr: Ipv4Addr) -> DnsPacket {
        let mut packet = DnsPacket::new(Header::response(0))
            .with_question(echo(qname))
            .with_answer(Record::A {
                domain: qname.into(),
                addr,
                ttl: 300,
            });
        packet.header.authoritative_answer = true;
        packet
    }

    #[tokio::test]
    async fn should_follow_referral_chain_with_glue() {
        crate::init_logs();

        let com_ns = Ipv4Addr::new(192, 5, 6, 30);
        let google_ns = Ipv4Addr::new(216, 239, 32, 10);
        let lookup = Arc::new(
            MockLookupService::default()
                .with_reply(
                    "www.google.com",
                    QueryType::A,
                    referral("www.google.com", "com", "a.gtld-servers.net", Some(com_ns)),
                )
                .with_reply(
                    "www.google.com",
                    QueryType::A,
                    referral("www.google.com", "google.com", "ns1.google.com", Some(google_ns)),
                )
                .with_reply(
                    "www.google.com",
                    QueryType::A,
                    authoritative("www.google.com", Ipv4Addr::new(142, 250, 0, 0)),
                ),
        );
        let resolver = Config::new(roots()).build(lookup.clone());

        let found = resolver.resolve(&echo("www.google.com")).await.unwrap();
        assert_eq!(found.header.response_code, ResponseCode::NoError);
        assert_eq!(
            found.answers,
            vec![Record::A {
                domain: "www.google.com".into(),
                addr: Ipv4Addr::new(142, 250, 0, 0),
                ttl: 300,
            }]
        );

        // one query per hop: root, com, google.com
        let journal = lookup.journal();
        assert_eq!(journal.len(), 3);
        assert_eq!(journal[0].0, roots());
        assert_eq!(journal[1].0, vec![com_ns]);
        assert_eq!(journal[2].0, vec![google_ns]);
    }

    #[tokio::test]
    async fn should_return_authoritative_name_error() {
        crate::init_logs();

        let mut reply = DnsPacket::new(Header::response(0))
            .with_question(echo("does-not-exist.example"))
            .with_response_code(ResponseCode::NameError);
        reply.header.authoritative_answer = true;
        let lookup = Arc::new(MockLookupService::default().with_reply(
            "does-not-exist.example",
            QueryType::A,
            reply,
        ));
        let resolver = Config::new(roots()).build(lookup.clone());

        let found = resolver
            .resolve(&echo("does-not-exist.example"))
            .await
            .unwrap();
        assert_eq!(found.header.response_code, ResponseCode::NameError);
        assert!(found.answers.is_empty());
        assert_eq!(lookup.journal().len(), 1);
    }

    #[tokio::test]
    async fn should_resolve_nameserver_when_glue_is_missing() {
        crate::init_logs();

        let ns_addr = Ipv4Addr::new(203, 0, 113, 53);
        let lookup = Arc::new(
            MockLookupService::default()
                .with_reply(
                    "www.example.com",
                    QueryType::A,
                    referral("www.example.com", "example.com", "ns1.example.net", None),
                )
                .with_reply(
                    "ns1.example.net",
                    QueryType::A,
                    authoritative("ns1.example.net", ns_addr),
                )
                .with_reply(
                    "www.example.com",
                    QueryType::A,
                    authoritative("www.example.com", Ipv4Addr::new(93, 184, 216, 34)),
                ),
        );
        let resolver = Config::new(roots()).build(lookup.clone());

        let found = resolver.resolve(&echo("www.example.com")).await.unwrap();
        assert_eq!(found.header.response_code, ResponseCode::NoError);
        assert!(!found.answers.is_empty());

        // the walk went back to the roots for the name server itself
        let journal = lookup.journal();
        assert_eq!(journal.len(), 3);
        let root_queries = journal.iter().filter(|entry| entry.0 == roots()).count();
        assert!(root_queries >= 2);
        assert_eq!(journal[1].1, "ns1.example.net");
        assert_eq!(journal[2].0, vec![ns_addr]);
    }

    #[tokio::test]
    async fn should_match_glue_ignoring_case() {
        crate::init_logs();

        // the authority names the server in one case, the glue in another
        let ns_addr = Ipv4Addr::new(192, 0, 2, 7);
        let mismatched = DnsPacket::new(Header::response(0))
            .with_question(echo("www.example.com"))
            .with_authority(Record::NS {
                domain: "example.com".into(),
                host: "ns1.example.net".into(),
                ttl: 172800,
            })
            .with_resource(Record::A {
                domain: "NS1.Example.NET".into(),
                addr: ns_addr,
                ttl: 172800,
            });
        let lookup = Arc::new(
            MockLookupService::default()
                .with_reply("www.example.com", QueryType::A, mismatched)
                .with_reply(
                    "www.example.com",
                    QueryType::A,
                    authoritative("www.example.com", Ipv4Addr::new(93, 184, 216, 34)),
                ),
        );
        let resolver = Config::new(roots()).build(lookup.clone());

        resolver.resolve(&echo("www.example.com")).await.unwrap();
        let journal = lookup.journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[1].0, vec![ns_addr]);
    }

    #[tokio::test]
    async fn should_fail_when_reply_id_does_not_match() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default().with_failure(
            "www.example.com",
            QueryType::A,
            LookupError::IdMismatch {
                sent: 1,
                received: 2,
            },
        ));
        let resolver = Config::new(roots()).build(lookup);

        let error = resolver.resolve(&echo("www.example.com")).await.unwrap_err();
        assert!(matches!(
            error,
            ResolveError::Lookup(LookupError::IdMismatch { .. })
        ));
        assert_eq!(error.response_code(), ResponseCode::ServerFailure);
    }

    #[tokio::test]
    async fn should_fail_on_reply_without_referral() {
        crate::init_logs();

        let lookup = Arc::new(MockLookupService::default().with_reply(
            "www.example.com",
            QueryType::A,
            DnsPacket::new(Header::response(0)).with_question(echo("www.example.com")),
        ));
        let resolver = Config::new(roots()).build(lookup);

        let error = resolver.resolve(&echo("www.example.com")).await.unwrap_err();
        assert!(matches!(error, ResolveError::NoReferral));
    }

    #[tokio::test]
    async fn should_give_up_after_iteration_budget() {
        crate::init_logs();

        let glue = Ipv4Addr::new(192, 0, 2, 1);
        let mut lookup = MockLookupService::default();
        // a lame server handing out the same referral forever
        for _ in 0..20 {
            lookup = lookup.with_reply(
                "www.example.com",
                QueryType::A,
                referral("www.example.com", "example.com", "ns1.example.net", Some(glue)),
            );
        }
        let lookup = Arc::new(lookup);
        let resolver = Config::new(roots()).build(lookup.clone());

        let error = resolver.resolve(&echo("www.example.com")).await.unwrap_err();
        assert!(matches!(error, ResolveError::IterationsExhausted));
        assert_eq!(lookup.journal().len(), 16);
    }

    #[tokio::test]
    async fn should_give_up_when_glue_recursion_is_too_deep() {
        crate::init_logs();

        // every name server lookup only uncovers another glueless referral
        let mut lookup = MockLookupService::default().with_reply(
            "www.example.com",
            QueryType::A,
            referral("www.example.com", "example.com", "ns0.example.net", None),
        );
        for depth in 0..10 {
            lookup = lookup.with_reply(
                &format!("ns{depth}.example.net"),
                QueryType::A,
                referral(
                    &format!("ns{depth}.example.net"),
                    "example.net",
                    &format!("ns{}.example.net", depth + 1),
                    None,
                ),
            );
        }
        let lookup = Arc::new(lookup);
        let resolver = Config::new(roots()).build(lookup);

        let error = resolver.resolve(&echo("www.example.com")).await.unwrap_err();
        assert!(matches!(error, ResolveError::NoNameserverAddress));
    }

    #[tokio::test]
    async fn should_return_cname_answer_without_chasing() {
        crate::init_logs();

        let mut reply = DnsPacket::new(Header::response(0))
            .with_question(echo("www.example.com"))
            .with_answer(Record::CNAME {
                domain: "www.example.com".into(),
                host: "example.com".into(),
                ttl: 300,
            });
        reply.header.authoritative_answer = true;
        let lookup = Arc::new(MockLookupService::default().with_reply(
            "www.example.com",
            QueryType::A,
            reply,
        ));
        let resolver = Config::new(roots()).build(lookup.clone());

        let found = resolver.resolve(&echo("www.example.com")).await.unwrap();
        assert_eq!(found.answers.len(), 1);
        assert!(matches!(found.answers[0], Record::CNAME { .. }));
        assert_eq!(lookup.journal().len(), 1);
    }
}
