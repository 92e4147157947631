//! XML-RPC requester.
//!
//! Encodes method calls, posts them with basic credentials and decodes the
//! `methodResponse` document into `XmlRpcValue` trees. Fault responses are
//! surfaced as `TransportError::Fault`.

use crate::{http_client, TransportError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use sign_types::SecretString;
use std::fmt::Write as _;
use tracing::debug;

const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// A value in an XML-RPC call or response.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcValue {
	Int(i64),
	Boolean(bool),
	String(String),
	Double(f64),
	DateTime(NaiveDateTime),
	Base64(Vec<u8>),
	Struct(IndexMap<String, XmlRpcValue>),
	Array(Vec<XmlRpcValue>),
	Nil,
}

impl XmlRpcValue {
	/// Starts an empty struct.
	pub fn new_struct() -> Self {
		XmlRpcValue::Struct(IndexMap::new())
	}

	/// Adds a member to a struct value. Non-struct values are returned as is.
	pub fn with(mut self, key: &str, value: impl Into<XmlRpcValue>) -> Self {
		if let XmlRpcValue::Struct(members) = &mut self {
			members.insert(key.to_string(), value.into());
		}
		self
	}

	/// Adds a member only when `value` is present.
	pub fn with_opt<V: Into<XmlRpcValue>>(self, key: &str, value: Option<V>) -> Self {
		match value {
			Some(value) => self.with(key, value),
			None => self,
		}
	}

	pub fn get(&self, key: &str) -> Option<&XmlRpcValue> {
		match self {
			XmlRpcValue::Struct(members) => members.get(key),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			XmlRpcValue::String(s) => Some(s),
			_ => None,
		}
	}

	/// Integer value, also accepting numeric strings.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			XmlRpcValue::Int(i) => Some(*i),
			XmlRpcValue::String(s) => s.trim().parse().ok(),
			_ => None,
		}
	}

	pub fn as_datetime(&self) -> Option<NaiveDateTime> {
		match self {
			XmlRpcValue::DateTime(dt) => Some(*dt),
			XmlRpcValue::String(s) => sign_types::parse_datetime(s).map(|dt| dt.naive_utc()),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			XmlRpcValue::Base64(bytes) => Some(bytes),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[XmlRpcValue]> {
		match self {
			XmlRpcValue::Array(items) => Some(items),
			_ => None,
		}
	}

	pub fn as_struct(&self) -> Option<&IndexMap<String, XmlRpcValue>> {
		match self {
			XmlRpcValue::Struct(members) => Some(members),
			_ => None,
		}
	}

	fn write_xml(&self, out: &mut String) {
		out.push_str("<value>");
		match self {
			// <int> is 32-bit; wider values use the <i8> extension.
			XmlRpcValue::Int(i) if i32::try_from(*i).is_ok() => {
				let _ = write!(out, "<int>{}</int>", i);
			},
			XmlRpcValue::Int(i) => {
				let _ = write!(out, "<i8>{}</i8>", i);
			},
			XmlRpcValue::Boolean(b) => {
				let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
			},
			XmlRpcValue::String(s) => {
				let _ = write!(out, "<string>{}</string>", escape(s.as_str()));
			},
			XmlRpcValue::Double(d) => {
				let _ = write!(out, "<double>{}</double>", d);
			},
			XmlRpcValue::DateTime(dt) => {
				let _ = write!(
					out,
					"<dateTime.iso8601>{}</dateTime.iso8601>",
					dt.format(DATETIME_FORMAT)
				);
			},
			XmlRpcValue::Base64(bytes) => {
				let _ = write!(out, "<base64>{}</base64>", STANDARD.encode(bytes));
			},
			XmlRpcValue::Struct(members) => {
				out.push_str("<struct>");
				for (name, value) in members {
					let _ = write!(out, "<member><name>{}</name>", escape(name.as_str()));
					value.write_xml(out);
					out.push_str("</member>");
				}
				out.push_str("</struct>");
			},
			XmlRpcValue::Array(items) => {
				out.push_str("<array><data>");
				for item in items {
					item.write_xml(out);
				}
				out.push_str("</data></array>");
			},
			XmlRpcValue::Nil => out.push_str("<nil/>"),
		}
		out.push_str("</value>");
	}
}

impl From<&str> for XmlRpcValue {
	fn from(value: &str) -> Self {
		XmlRpcValue::String(value.to_string())
	}
}

impl From<String> for XmlRpcValue {
	fn from(value: String) -> Self {
		XmlRpcValue::String(value)
	}
}

impl From<&String> for XmlRpcValue {
	fn from(value: &String) -> Self {
		XmlRpcValue::String(value.clone())
	}
}

impl From<i64> for XmlRpcValue {
	fn from(value: i64) -> Self {
		XmlRpcValue::Int(value)
	}
}

impl From<i32> for XmlRpcValue {
	fn from(value: i32) -> Self {
		XmlRpcValue::Int(value.into())
	}
}

impl From<u32> for XmlRpcValue {
	fn from(value: u32) -> Self {
		XmlRpcValue::Int(value.into())
	}
}

impl From<bool> for XmlRpcValue {
	fn from(value: bool) -> Self {
		XmlRpcValue::Boolean(value)
	}
}

impl From<f64> for XmlRpcValue {
	fn from(value: f64) -> Self {
		XmlRpcValue::Double(value)
	}
}

impl From<NaiveDateTime> for XmlRpcValue {
	fn from(value: NaiveDateTime) -> Self {
		XmlRpcValue::DateTime(value)
	}
}

impl From<Vec<u8>> for XmlRpcValue {
	fn from(value: Vec<u8>) -> Self {
		XmlRpcValue::Base64(value)
	}
}

impl From<Vec<XmlRpcValue>> for XmlRpcValue {
	fn from(value: Vec<XmlRpcValue>) -> Self {
		XmlRpcValue::Array(value)
	}
}

/// Serializes a method call document.
pub fn encode_call(method: &str, params: &[XmlRpcValue]) -> String {
	let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
	let _ = write!(
		out,
		"<methodCall><methodName>{}</methodName><params>",
		escape(method)
	);
	for param in params {
		out.push_str("<param>");
		param.write_xml(&mut out);
		out.push_str("</param>");
	}
	out.push_str("</params></methodCall>");
	out
}

/// Minimal element tree built from reader events.
#[derive(Debug, Default)]
struct Node {
	name: String,
	text: String,
	children: Vec<Node>,
}

impl Node {
	fn child(&self, name: &str) -> Option<&Node> {
		self.children.iter().find(|c| c.name == name)
	}

	fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
		self.children.iter().filter(move |c| c.name == name)
	}
}

fn invalid(message: impl Into<String>) -> TransportError {
	TransportError::InvalidResponse(message.into())
}

fn element_name(raw: &[u8]) -> Result<String, TransportError> {
	std::str::from_utf8(raw)
		.map(str::to_string)
		.map_err(|e| invalid(format!("Non UTF-8 element name: {}", e)))
}

fn parse_tree(xml: &str) -> Result<Node, TransportError> {
	let mut reader = Reader::from_str(xml);
	let mut stack: Vec<Node> = Vec::new();
	let mut root: Option<Node> = None;

	loop {
		match reader
			.read_event()
			.map_err(|e| invalid(format!("Malformed XML: {}", e)))?
		{
			Event::Start(e) => stack.push(Node {
				name: element_name(e.local_name().as_ref())?,
				..Default::default()
			}),
			Event::Empty(e) => {
				let node = Node {
					name: element_name(e.local_name().as_ref())?,
					..Default::default()
				};
				match stack.last_mut() {
					Some(parent) => parent.children.push(node),
					None => root = Some(node),
				}
			},
			Event::End(_) => {
				let node = stack.pop().ok_or_else(|| invalid("Unbalanced closing tag"))?;
				match stack.last_mut() {
					Some(parent) => parent.children.push(node),
					None => root = Some(node),
				}
			},
			Event::Text(t) => {
				if let Some(current) = stack.last_mut() {
					let text = t
						.unescape()
						.map_err(|e| invalid(format!("Invalid text: {}", e)))?;
					current.text.push_str(&text);
				}
			},
			Event::CData(c) => {
				if let Some(current) = stack.last_mut() {
					let raw = c.into_inner();
					current.text.push_str(&String::from_utf8_lossy(&raw));
				}
			},
			Event::Eof => break,
			_ => {},
		}
	}

	if !stack.is_empty() {
		return Err(invalid("Unexpected end of document"));
	}
	root.ok_or_else(|| invalid("Empty document"))
}

fn decode_value(node: &Node) -> Result<XmlRpcValue, TransportError> {
	// An untyped <value> holds a string.
	let Some(typed) = node.children.first() else {
		return Ok(XmlRpcValue::String(node.text.clone()));
	};
	let text = typed.text.trim();

	match typed.name.as_str() {
		"int" | "i4" | "i8" => text
			.parse()
			.map(XmlRpcValue::Int)
			.map_err(|_| invalid(format!("Invalid integer '{}'", text))),
		"boolean" => match text {
			"1" | "true" => Ok(XmlRpcValue::Boolean(true)),
			"0" | "false" => Ok(XmlRpcValue::Boolean(false)),
			other => Err(invalid(format!("Invalid boolean '{}'", other))),
		},
		"string" => Ok(XmlRpcValue::String(typed.text.clone())),
		"double" => text
			.parse()
			.map(XmlRpcValue::Double)
			.map_err(|_| invalid(format!("Invalid double '{}'", text))),
		"dateTime.iso8601" => NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
			.ok()
			.or_else(|| sign_types::parse_datetime(text).map(|dt| dt.naive_utc()))
			.map(XmlRpcValue::DateTime)
			.ok_or_else(|| invalid(format!("Invalid dateTime '{}'", text))),
		"base64" => {
			let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
			STANDARD
				.decode(compact)
				.map(XmlRpcValue::Base64)
				.map_err(|e| invalid(format!("Invalid base64: {}", e)))
		},
		"struct" => {
			let mut members = IndexMap::new();
			for member in typed.children_named("member") {
				let name = member
					.child("name")
					.ok_or_else(|| invalid("Struct member without name"))?;
				let value = member
					.child("value")
					.ok_or_else(|| invalid("Struct member without value"))?;
				members.insert(name.text.trim().to_string(), decode_value(value)?);
			}
			Ok(XmlRpcValue::Struct(members))
		},
		"array" => {
			let items = match typed.child("data") {
				Some(data) => data
					.children_named("value")
					.map(decode_value)
					.collect::<Result<Vec<_>, _>>()?,
				None => Vec::new(),
			};
			Ok(XmlRpcValue::Array(items))
		},
		"nil" => Ok(XmlRpcValue::Nil),
		other => Err(invalid(format!("Unsupported XML-RPC type '{}'", other))),
	}
}

/// Decodes a `methodResponse` document.
pub fn decode_response(xml: &str) -> Result<XmlRpcValue, TransportError> {
	let root = parse_tree(xml)?;
	if root.name != "methodResponse" {
		return Err(invalid(format!("Unexpected root element '{}'", root.name)));
	}

	if let Some(fault) = root.child("fault") {
		let value = fault
			.child("value")
			.map(decode_value)
			.transpose()?
			.unwrap_or(XmlRpcValue::Nil);
		return Err(TransportError::Fault {
			code: value.get("faultCode").and_then(XmlRpcValue::as_i64).unwrap_or(0),
			message: value
				.get("faultString")
				.and_then(XmlRpcValue::as_str)
				.unwrap_or("Unknown fault")
				.to_string(),
		});
	}

	root.child("params")
		.and_then(|params| params.child("param"))
		.and_then(|param| param.child("value"))
		.map(decode_value)
		.unwrap_or(Ok(XmlRpcValue::Nil))
}

/// XML-RPC client authenticated with basic credentials.
#[derive(Debug, Clone)]
pub struct XmlRpcRequester {
	client: reqwest::Client,
	endpoint: String,
	username: String,
	password: SecretString,
}

impl XmlRpcRequester {
	pub fn new(
		endpoint: impl Into<String>,
		username: impl Into<String>,
		password: SecretString,
	) -> Result<Self, TransportError> {
		Ok(Self {
			client: http_client()?,
			endpoint: endpoint.into(),
			username: username.into(),
			password,
		})
	}

	/// Calls a remote method and returns its single result value.
	pub async fn call(&self, method: &str, params: &[XmlRpcValue]) -> Result<XmlRpcValue, TransportError> {
		debug!(method, endpoint = %self.endpoint, "Sending XML-RPC call");

		let response = self
			.client
			.post(&self.endpoint)
			.basic_auth(&self.username, Some(self.password.expose_secret()))
			.header(reqwest::header::CONTENT_TYPE, "text/xml; charset=utf-8")
			.body(encode_call(method, params))
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await?;
		if status.is_client_error() || status.is_server_error() {
			// Some servers wrap faults in error statuses.
			if let Err(fault @ TransportError::Fault { .. }) = decode_response(&body) {
				return Err(fault);
			}
			return Err(TransportError::Api {
				status: status.as_u16(),
				message: status
					.canonical_reason()
					.unwrap_or("Unknown error")
					.to_string(),
			});
		}

		decode_response(&body)
	}
}
