use std::collections::HashMap;

use serde::{Deserialize, Serialize};
pub use serde_json::Error;

/// One assembled source line: where it landed and what it produced.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SdbLine {
    pub address: u32,
    pub line_number: usize,
    pub text: String,
    pub object_code: String,
}

/// Debug symbols for an assembled program, written alongside the object
/// program so downstream tools can map addresses back to source.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Sdb {
    pub name: String,
    pub start: u32,
    pub lines: Vec<SdbLine>,
    pub address_map: HashMap<u32, usize>,
    pub labels: HashMap<String, u32>,
}

impl Sdb {
    pub fn new(name: &str, start: u32) -> Self {
        Sdb {
            name: name.into(),
            start,
            lines: Vec::new(),
            address_map: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    pub fn add_label(&mut self, label: String, address: u32) {
        self.labels.insert(label, address);
    }

    pub fn add_line(&mut self, address: u32, line_number: usize, text: String, object_code: String) {
        self.lines.push(SdbLine {
            address,
            line_number,
            text,
            object_code,
        });
        self.address_map.insert(address, self.lines.len() - 1);
    }

    pub fn line_at(&self, address: u32) -> Option<&SdbLine> {
        self.address_map.get(&address).map(|&i| &self.lines[i])
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(dbg: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(dbg)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let mut sdb = Sdb::new("COPY", 0x1000);
        sdb.add_label("RDREC".into(), 0x2039);
        sdb.add_line(0x1000, 2, "FIRST   STL     RETADR".into(), "17202D".into());

        let json = sdb.to_json().unwrap();
        let back = Sdb::from_json(&json).unwrap();
        assert_eq!(back.name, "COPY");
        assert_eq!(back.labels["RDREC"], 0x2039);
        assert_eq!(back.line_at(0x1000).unwrap().object_code, "17202D");
    }
}
