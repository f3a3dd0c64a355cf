/// Translates a codon to its one-letter amino acid. Gaps map to `-`,
/// anything unrecognised to `?`.
pub fn translate(codon: &str) -> &'static str {
    match codon.to_ascii_uppercase().as_str() {
        "TTT" | "TTC" => "F",
        "TTA" | "TTG" | "CTT" | "CTC" | "CTA" | "CTG" => "L",
        "ATT" | "ATC" | "ATA" => "I",
        "ATG" => "M",
        "GTT" | "GTC" | "GTA" | "GTG" => "V",
        "TCT" | "TCC" | "TCA" | "TCG" | "AGT" | "AGC" => "S",
        "CCT" | "CCC" | "CCA" | "CCG" => "P",
        "ACT" | "ACC" | "ACA" | "ACG" => "T",
        "GCT" | "GCC" | "GCA" | "GCG" => "A",
        "TAT" | "TAC" => "Y",
        "TAA" | "TAG" | "TGA" => "*",
        "CAT" | "CAC" => "H",
        "CAA" | "CAG" => "Q",
        "AAT" | "AAC" => "N",
        "AAA" | "AAG" => "K",
        "GAT" | "GAC" => "D",
        "GAA" | "GAG" => "E",
        "TGT" | "TGC" => "C",
        "TGG" => "W",
        "CGT" | "CGC" | "CGA" | "CGG" | "AGA" | "AGG" => "R",
        "GGT" | "GGC" | "GGA" | "GGG" => "G",
        "---" => "-",
        _ => "?",
    }
}

pub fn is_nucleotide(c: char) -> bool {
    matches!(c, 'A' | 'C' | 'G' | 'T')
}

/// Insertion-ordered counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: Vec<(String, usize)>,
}

impl Tally {
    pub fn increment(&mut self, key: &str) {
        match self.counts.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 += 1,
            None => self.counts.push((key.to_string(), 1)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, n)| (k.as_str(), *n))
    }

    /// Most frequent key; the first one seen wins a tie.
    pub fn majority(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for (key, count) in self.iter() {
            if best.map(|(_, n)| count > n).unwrap_or(true) {
                best = Some((key, count));
            }
        }
        best.map(|(key, _)| key)
    }

    /// `key:count` pairs joined by `sep`.
    pub fn format(&self, sep: &str) -> String {
        self.iter()
            .map(|(key, count)| format!("{}:{}", key, count))
            .collect::<Vec<_>>()
            .join(sep)
    }

    pub fn merge(&mut self, other: &Tally) {
        for (key, count) in other.iter() {
            for _ in 0..count {
                self.increment(key);
            }
        }
    }
}
