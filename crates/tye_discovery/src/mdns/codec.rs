//! Just enough of the DNS wire format (RFC 1035) for service browsing.

use std::net::Ipv4Addr;
use thiserror::Error;

pub const TYPE_A: u16 = 1;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_SRV: u16 = 33;
pub const CLASS_IN: u16 = 1;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_AUTHORITATIVE: u16 = 0x0400;
/// mDNS reuses the top class bit for cache-flush / unicast-response.
const CLASS_MASK: u16 = 0x7fff;
const MAX_POINTER_JUMPS: usize = 32;
const MAX_NAME_LENGTH: usize = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet truncated at offset {0}")]
    Truncated(usize),

    #[error("invalid label at offset {0}")]
    InvalidLabel(usize),

    #[error("compression pointer loop at offset {0}")]
    PointerLoop(usize),

    #[error("name exceeds 255 bytes")]
    NameTooLong,
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Ptr(String),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Txt(Vec<String>),
    Other(Vec<u8>),
}

impl RecordData {
    fn rtype(&self, fallback: u16) -> u16 {
        match self {
            RecordData::A(_) => TYPE_A,
            RecordData::Ptr(_) => TYPE_PTR,
            RecordData::Srv { .. } => TYPE_SRV,
            RecordData::Txt(_) => TYPE_TXT,
            RecordData::Other(_) => fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub data: RecordData,
}

impl Record {
    pub fn new(name: &str, ttl: u32, data: RecordData) -> Self {
        Self {
            name: name.to_string(),
            rtype: data.rtype(0),
            class: CLASS_IN,
            ttl,
            data,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub id: u16,
    pub flags: u16,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Packet {
    /// A one-question multicast query.
    pub fn query(name: &str, qtype: u16) -> Self {
        Self {
            questions: vec![Question {
                name: name.to_string(),
                qtype,
                qclass: CLASS_IN,
            }],
            ..Self::default()
        }
    }

    pub fn response(answers: Vec<Record>, additionals: Vec<Record>) -> Self {
        Self {
            flags: FLAG_RESPONSE | FLAG_AUTHORITATIVE,
            answers,
            additionals,
            ..Self::default()
        }
    }

    pub fn is_response(&self) -> bool {
        self.flags & FLAG_RESPONSE != 0
    }

    /// Answers first, then additionals.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.answers.iter().chain(self.additionals.iter())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(512);
        put_u16(&mut out, self.id);
        put_u16(&mut out, self.flags);
        put_u16(&mut out, self.questions.len() as u16);
        put_u16(&mut out, self.answers.len() as u16);
        put_u16(&mut out, self.authorities.len() as u16);
        put_u16(&mut out, self.additionals.len() as u16);

        for question in &self.questions {
            put_name(&mut out, &question.name);
            put_u16(&mut out, question.qtype);
            put_u16(&mut out, question.qclass);
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            put_record(&mut out, record);
        }

        out
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut reader = Reader { bytes, pos: 0 };

        let id = reader.u16()?;
        let flags = reader.u16()?;
        let counts = [reader.u16()?, reader.u16()?, reader.u16()?, reader.u16()?];

        let mut questions = Vec::with_capacity(counts[0] as usize);
        for _ in 0..counts[0] {
            questions.push(Question {
                name: reader.name()?,
                qtype: reader.u16()?,
                qclass: reader.u16()? & CLASS_MASK,
            });
        }

        let mut sections = [Vec::new(), Vec::new(), Vec::new()];
        for (section, &count) in sections.iter_mut().zip(&counts[1..]) {
            for _ in 0..count {
                section.push(reader.record()?);
            }
        }
        let [answers, authorities, additionals] = sections;

        Ok(Self {
            id,
            flags,
            questions,
            answers,
            authorities,
            additionals,
        })
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    for label in name.trim_end_matches('.').split('.').filter(|l| !l.is_empty()) {
        let label = &label.as_bytes()[..label.len().min(63)];
        out.push(label.len() as u8);
        out.extend_from_slice(label);
    }
    out.push(0);
}

fn put_record(out: &mut Vec<u8>, record: &Record) {
    put_name(out, &record.name);
    put_u16(out, record.rtype);
    put_u16(out, record.class);
    out.extend_from_slice(&record.ttl.to_be_bytes());

    let mut rdata = Vec::new();
    match &record.data {
        RecordData::A(address) => rdata.extend_from_slice(&address.octets()),
        RecordData::Ptr(name) => put_name(&mut rdata, name),
        RecordData::Srv {
            priority,
            weight,
            port,
            target,
        } => {
            put_u16(&mut rdata, *priority);
            put_u16(&mut rdata, *weight);
            put_u16(&mut rdata, *port);
            put_name(&mut rdata, target);
        }
        RecordData::Txt(entries) => {
            for entry in entries {
                let entry = &entry.as_bytes()[..entry.len().min(255)];
                rdata.push(entry.len() as u8);
                rdata.extend_from_slice(entry);
            }
        }
        RecordData::Other(bytes) => rdata.extend_from_slice(bytes),
    }

    put_u16(out, rdata.len() as u16);
    out.extend_from_slice(&rdata);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        let end = end.ok_or(CodecError::Truncated(self.pos))?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> CodecResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a possibly compressed name; the cursor ends after its first encoding.
    fn name(&mut self) -> CodecResult<String> {
        let mut labels: Vec<String> = Vec::new();
        let mut length = 0usize;
        let mut cursor = self.pos;
        let mut resume = None;
        let mut jumps = 0;

        loop {
            let len = *self.bytes.get(cursor).ok_or(CodecError::Truncated(cursor))? as usize;

            match len & 0xc0 {
                0x00 if len == 0 => {
                    cursor += 1;
                    break;
                }
                0x00 => {
                    let start = cursor + 1;
                    let label = self
                        .bytes
                        .get(start..start + len)
                        .ok_or(CodecError::Truncated(start))?;
                    length += len + 1;
                    if length > MAX_NAME_LENGTH {
                        return Err(CodecError::NameTooLong);
                    }
                    labels.push(String::from_utf8_lossy(label).into_owned());
                    cursor = start + len;
                }
                0xc0 => {
                    let low = *self.bytes.get(cursor + 1).ok_or(CodecError::Truncated(cursor))? as usize;
                    jumps += 1;
                    if jumps > MAX_POINTER_JUMPS {
                        return Err(CodecError::PointerLoop(cursor));
                    }
                    resume.get_or_insert(cursor + 2);
                    cursor = ((len & 0x3f) << 8) | low;
                }
                _ => return Err(CodecError::InvalidLabel(cursor)),
            }
        }

        self.pos = resume.unwrap_or(cursor);
        Ok(labels.join("."))
    }

    fn record(&mut self) -> CodecResult<Record> {
        let name = self.name()?;
        let rtype = self.u16()?;
        let class = self.u16()? & CLASS_MASK;
        let ttl = self.u32()?;
        let rdlength = self.u16()? as usize;

        let rdata_start = self.pos;
        let rdata_end = rdata_start + rdlength;
        if rdata_end > self.bytes.len() {
            return Err(CodecError::Truncated(rdata_start));
        }

        let data = match rtype {
            TYPE_A if rdlength == 4 => {
                let b = self.take(4)?;
                RecordData::A(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            TYPE_PTR => RecordData::Ptr(self.name()?),
            TYPE_SRV => RecordData::Srv {
                priority: self.u16()?,
                weight: self.u16()?,
                port: self.u16()?,
                target: self.name()?,
            },
            TYPE_TXT => {
                let mut entries = Vec::new();
                while self.pos < rdata_end {
                    let len = self.u8()? as usize;
                    entries.push(String::from_utf8_lossy(self.take(len)?).into_owned());
                }
                RecordData::Txt(entries)
            }
            _ => RecordData::Other(self.take(rdlength)?.to_vec()),
        };

        // Names inside rdata may be compressed, so trust rdlength for the next record.
        self.pos = rdata_end;

        Ok(Record {
            name,
            rtype,
            class,
            ttl,
            data,
        })
    }
}
