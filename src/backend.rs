use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::error::{BenchError, Result};
use crate::query::{
	build_query, outcome_for, parse_response, ParseFailure, TestQuery, WireResponse,
};

/// Capability interface the engine depends on: issue one query against one
/// nameserver and return a structured result.
///
/// All faults are encoded in the returned `WireResponse` (timeout, malformed)
/// rather than propagated, so callers treat every exchange as a data point.
#[async_trait]
pub trait QueryBackend: fmt::Debug + Send + Sync {
	async fn query(
		&self,
		server: SocketAddr,
		query: &TestQuery,
		timeout: Duration,
	) -> WireResponse;
}

/// Plain DNS over UDP port 53.
///
/// Binds a dedicated socket per query to avoid response stealing between
/// concurrent tasks sharing the same resolver socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpBackend;

#[async_trait]
impl QueryBackend for UdpBackend {
	async fn query(
		&self,
		server: SocketAddr,
		query: &TestQuery,
		timeout: Duration,
	) -> WireResponse {
		let txid: u16 = rand::random();
		let query_bytes = match build_query(&query.hostname, query.record, txid) {
			Ok(bytes) => bytes,
			Err(_) => return WireResponse::malformed(Duration::ZERO),
		};

		let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
		let socket = match UdpSocket::bind(bind_addr).await {
			Ok(s) => s,
			Err(_) => return WireResponse::timeout(timeout),
		};

		// Start timing immediately around send+recv
		let start = Instant::now();
		if socket.send_to(&query_bytes, server).await.is_err() {
			return WireResponse::timeout(timeout);
		}

		// Use a 4096-byte buffer to handle EDNS-extended responses
		let mut buf = vec![0u8; 4096];
		loop {
			let elapsed = start.elapsed();
			if elapsed >= timeout {
				break;
			}
			let remaining = timeout - elapsed;

			match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
				Ok(Ok((len, _src))) => {
					let duration = start.elapsed();
					match parse_response(&buf[..len], txid) {
						Ok(parsed) => {
							return WireResponse {
								outcome: outcome_for(parsed.rcode),
								duration,
								answers: parsed.answers,
							};
						}
						// Stray datagram; keep waiting for ours
						Err(ParseFailure::TxidMismatch) => continue,
						Err(ParseFailure::Malformed) => {
							return WireResponse::malformed(duration);
						}
					}
				}
				// Timeout or recv error
				_ => break,
			}
		}

		WireResponse::timeout(start.elapsed())
	}
}

/// DNS over TLS (RFC 7858): TCP to port 853, TLS, two-byte length framing.
///
/// Opens a fresh connection per query, so the measured duration includes
/// connection and handshake cost. That is deliberate; it reflects what a
/// stub resolver without a persistent connection would see.
#[derive(Debug, Clone)]
pub struct DotBackend {
	tls_config: Arc<rustls::ClientConfig>,
}

impl DotBackend {
	pub fn new() -> Self {
		let mut roots = rustls::RootCertStore::empty();
		roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
		let tls_config = rustls::ClientConfig::builder()
			.with_root_certificates(roots)
			.with_no_client_auth();
		Self { tls_config: Arc::new(tls_config) }
	}

	async fn exchange(&self, target: SocketAddr, query_bytes: &[u8]) -> std::io::Result<Vec<u8>> {
		let stream = TcpStream::connect(target).await?;
		let connector = tokio_rustls::TlsConnector::from(Arc::clone(&self.tls_config));
		let name = rustls::pki_types::ServerName::from(target.ip());
		let mut tls = connector.connect(name, stream).await?;

		let mut framed = Vec::with_capacity(query_bytes.len() + 2);
		framed.extend_from_slice(&(query_bytes.len() as u16).to_be_bytes());
		framed.extend_from_slice(query_bytes);
		tls.write_all(&framed).await?;

		let mut len_buf = [0u8; 2];
		tls.read_exact(&mut len_buf).await?;
		let len = u16::from_be_bytes(len_buf) as usize;
		let mut response = vec![0u8; len];
		tls.read_exact(&mut response).await?;
		Ok(response)
	}
}

impl Default for DotBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl QueryBackend for DotBackend {
	async fn query(
		&self,
		server: SocketAddr,
		query: &TestQuery,
		timeout: Duration,
	) -> WireResponse {
		// Candidate lists carry the plain-DNS port; map it to DoT
		let port = if server.port() == 53 { 853 } else { server.port() };
		let target = SocketAddr::new(server.ip(), port);

		let txid: u16 = rand::random();
		let query_bytes = match build_query(&query.hostname, query.record, txid) {
			Ok(bytes) => bytes,
			Err(_) => return WireResponse::malformed(Duration::ZERO),
		};

		let start = Instant::now();
		match tokio::time::timeout(timeout, self.exchange(target, &query_bytes)).await {
			Ok(Ok(response)) => {
				let duration = start.elapsed();
				match parse_response(&response, txid) {
					Ok(parsed) => WireResponse {
						outcome: outcome_for(parsed.rcode),
						duration,
						answers: parsed.answers,
					},
					Err(_) => WireResponse::malformed(duration),
				}
			}
			// Connection refusal and timeout both count as no response
			Ok(Err(_)) | Err(_) => WireResponse::timeout(start.elapsed()),
		}
	}
}

/// DNS over HTTPS (RFC 8484): POST of the wire-format query.
#[derive(Debug, Clone)]
pub struct DohBackend {
	client: reqwest::Client,
}

impl DohBackend {
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.build()
			.map_err(|e| BenchError::Backend(e.to_string()))?;
		Ok(Self { client })
	}

	fn url_for(server: SocketAddr) -> String {
		match server.ip() {
			IpAddr::V6(v6) => format!("https://[{}]/dns-query", v6),
			IpAddr::V4(v4) => format!("https://{}/dns-query", v4),
		}
	}
}

#[async_trait]
impl QueryBackend for DohBackend {
	async fn query(
		&self,
		server: SocketAddr,
		query: &TestQuery,
		timeout: Duration,
	) -> WireResponse {
		let txid: u16 = rand::random();
		let query_bytes = match build_query(&query.hostname, query.record, txid) {
			Ok(bytes) => bytes,
			Err(_) => return WireResponse::malformed(Duration::ZERO),
		};

		let start = Instant::now();
		let request = self.client
			.post(Self::url_for(server))
			.header("content-type", "application/dns-message")
			.header("accept", "application/dns-message")
			.timeout(timeout)
			.body(query_bytes);

		let response = match request.send().await {
			Ok(r) => r,
			Err(_) => return WireResponse::timeout(start.elapsed()),
		};
		let body = match response.bytes().await {
			Ok(b) => b,
			Err(_) => return WireResponse::malformed(start.elapsed()),
		};

		let duration = start.elapsed();
		match parse_response(&body, txid) {
			Ok(parsed) => WireResponse {
				outcome: outcome_for(parsed.rcode),
				duration,
				answers: parsed.answers,
			},
			Err(_) => WireResponse::malformed(duration),
		}
	}
}
