use crate::ingress::MAX_LINE_LEN;
use atat::atat_derive::AtatResp;
use heapless::{String, Vec};

/// Max. number of information lines collected for a single command, e.g. CIFSR
pub(crate) const MAX_RESPONSE_LINES: usize = 6;

/// Reply of AT+CWJAP? if not joined to any access point
pub(crate) const NO_AP: &str = "No AP";

/// Information lines (starting with `+`, or [NO_AP]) received while a command was in flight
pub(crate) type Responses = Vec<String<MAX_LINE_LEN>, MAX_RESPONSE_LINES>;

/// Commands which gets just responded by OK
#[derive(Clone, AtatResp)]
pub struct NoResponse;

/// Final result codes terminating a command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ResponseCode {
    Ok,
    Error,
    Fail,
    SendOk,
    SendFail,
}

impl ResponseCode {
    pub(crate) fn parse(line: &str) -> Option<Self> {
        match line {
            "OK" => Some(Self::Ok),
            // Older AT firmware answers with 'no change' instead of OK if the value is already set
            "no change" => Some(Self::Ok),
            "ERROR" => Some(Self::Error),
            "FAIL" => Some(Self::Fail),
            "SEND OK" => Some(Self::SendOk),
            "SEND FAIL" => Some(Self::SendFail),
            _ => None,
        }
    }
}

/// Returns the parameter part of an information line, e.g. `1` for `+CWMODE:1`.
/// The `_CUR` and `_DEF` suffixes of AT firmware 1.x are accepted.
pub(crate) fn parameters<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    let rest = rest
        .strip_prefix("_CUR")
        .or_else(|| rest.strip_prefix("_DEF"))
        .unwrap_or(rest);

    rest.strip_prefix(':')
}

/// Iterator over the comma separated fields of a response. Quotes of string fields are removed.
pub(crate) struct Fields<'a> {
    remaining: Option<&'a str>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(parameters: &'a str) -> Self {
        Self {
            remaining: Some(parameters),
        }
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.remaining?;

        if let Some(quoted) = rest.strip_prefix('"') {
            let bytes = quoted.as_bytes();
            let mut index = 0;

            while index < bytes.len() {
                match bytes[index] {
                    b'\\' => index += 2,
                    b'"' => {
                        let after = &quoted[index + 1..];
                        self.remaining = after.strip_prefix(',');
                        return Some(&quoted[..index]);
                    }
                    _ => index += 1,
                }
            }

            // Missing closing quote
            self.remaining = None;
            return Some(quoted);
        }

        match rest.find(',') {
            Some(index) => {
                self.remaining = Some(&rest[index + 1..]);
                Some(&rest[..index])
            }
            None => {
                self.remaining = None;
                Some(rest)
            }
        }
    }
}
