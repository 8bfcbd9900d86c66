// HaulSim: Open-Pit Haulage Simulator written in Rust
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Textual mine description format.
//!
//! Two formats exist, distinguished by the token count of the `T` header
//! line. The single-crusher format:
//!
//! ```text
//! T <num_trucks>
//! C 1
//! <empty_mean> <empty_sd>
//! S <num_shovels>
//! <travel_mean> <travel_sd> <fill_mean> <fill_sd>     (one line per shovel)
//! ```
//!
//! The routed format:
//!
//! ```text
//! T <num_trucks> <full_slowdown>
//! C <num_crushers>
//! <empty_mean> <empty_sd>                             (one line per crusher)
//! S <num_shovels>
//! <fill_mean> <fill_sd>                               (one line per shovel)
//! R <num_roads> N <num_junctions>
//! <n1> <i1> <n2> <i2> <travel_mean> <travel_sd> <kind>  (one line per road)
//! ```
//!
//! where `n1`/`n2` are `c`, `s`, or `n` (crusher, shovel, junction), and
//! `kind` is `t` (two-lane) or `o` (one-lane). Any deviation (wrong token
//! count, non-numeric field, unknown tag) is a hard parse failure naming
//! the offending line.

use itertools::Itertools;

use crate::network::{LaneKind, MineNetwork, NodeRef, RoadParams, ServiceParams};
use crate::types::{CrusherId, ShovelId, SimError};

/// Parse a mine description in either format.
pub fn parse(input: &str) -> Result<MineNetwork, SimError> {
    let mut lines = Lines::new(input);
    let header = lines.next("T <num_trucks> [<full_slowdown>]")?;
    match header.len() {
        2 => parse_simple(header, lines),
        3 => parse_routed(header, lines),
        _ => Err(lines.err("T <num_trucks> [<full_slowdown>]")),
    }
}

fn parse_simple(header: Tokens<'_>, mut lines: Lines<'_>) -> Result<MineNetwork, SimError> {
    let num_trucks = header.field::<usize>(1, "T <num_trucks>")?;
    if header.field::<&str>(0, "T")? != "T" {
        return Err(header.error("T <num_trucks>"));
    }

    let c_header = lines.next("C 1")?;
    if c_header.tokens != ["C", "1"] {
        return Err(c_header.error("C 1"));
    }
    let c_line = lines.next("<empty_mean> <empty_sd>")?;
    c_line.expect_len(2)?;
    let crusher = ServiceParams::new(c_line.field(0, "empty_mean")?, c_line.field(1, "empty_sd")?);

    let s_header = lines.next("S <num_shovels>")?;
    s_header.expect_len(2)?;
    if s_header.field::<&str>(0, "S")? != "S" {
        return Err(s_header.error("S <num_shovels>"));
    }
    let num_shovels: usize = s_header.field(1, "num_shovels")?;

    let mut shovels = Vec::with_capacity(num_shovels);
    for _ in 0..num_shovels {
        let line = lines.next("<travel_mean> <travel_sd> <fill_mean> <fill_sd>")?;
        line.expect_len(4)?;
        shovels.push((
            ServiceParams::new(line.field(0, "travel_mean")?, line.field(1, "travel_sd")?),
            ServiceParams::new(line.field(2, "fill_mean")?, line.field(3, "fill_sd")?),
        ));
    }
    lines.expect_end()?;
    MineNetwork::simple(num_trucks, crusher, shovels)
}

fn parse_routed(header: Tokens<'_>, mut lines: Lines<'_>) -> Result<MineNetwork, SimError> {
    if header.field::<&str>(0, "T")? != "T" {
        return Err(header.error("T <num_trucks> <full_slowdown>"));
    }
    let num_trucks: usize = header.field(1, "num_trucks")?;
    let full_slowdown: f64 = header.field(2, "full_slowdown")?;

    let c_header = lines.next("C <num_crushers>")?;
    c_header.expect_len(2)?;
    if c_header.field::<&str>(0, "C")? != "C" {
        return Err(c_header.error("C <num_crushers>"));
    }
    let num_crushers: usize = c_header.field(1, "num_crushers")?;
    let mut crushers = Vec::with_capacity(num_crushers);
    for _ in 0..num_crushers {
        let line = lines.next("<empty_mean> <empty_sd>")?;
        line.expect_len(2)?;
        crushers.push(ServiceParams::new(
            line.field(0, "empty_mean")?,
            line.field(1, "empty_sd")?,
        ));
    }

    let s_header = lines.next("S <num_shovels>")?;
    s_header.expect_len(2)?;
    if s_header.field::<&str>(0, "S")? != "S" {
        return Err(s_header.error("S <num_shovels>"));
    }
    let num_shovels: usize = s_header.field(1, "num_shovels")?;
    let mut shovels = Vec::with_capacity(num_shovels);
    for _ in 0..num_shovels {
        let line = lines.next("<fill_mean> <fill_sd>")?;
        line.expect_len(2)?;
        shovels.push(ServiceParams::new(
            line.field(0, "fill_mean")?,
            line.field(1, "fill_sd")?,
        ));
    }

    let r_header = lines.next("R <num_roads> N <num_junctions>")?;
    r_header.expect_len(4)?;
    if r_header.field::<&str>(0, "R")? != "R" || r_header.field::<&str>(2, "N")? != "N" {
        return Err(r_header.error("R <num_roads> N <num_junctions>"));
    }
    let num_roads: usize = r_header.field(1, "num_roads")?;
    let num_junctions: usize = r_header.field(3, "num_junctions")?;

    let mut roads = Vec::with_capacity(num_roads);
    for _ in 0..num_roads {
        let line = lines.next("<n1> <i1> <n2> <i2> <travel_mean> <travel_sd> <kind>")?;
        line.expect_len(7)?;
        let a = parse_node(&line, 0, num_crushers, num_shovels, num_junctions)?;
        let b = parse_node(&line, 2, num_crushers, num_shovels, num_junctions)?;
        let mean: f64 = line.field(4, "travel_mean")?;
        let sd: f64 = line.field(5, "travel_sd")?;
        let kind = match line.field::<&str>(6, "road kind (t|o)")? {
            "t" => LaneKind::TwoLane,
            "o" => LaneKind::OneLane,
            _ => return Err(line.error("road kind (t|o)")),
        };
        roads.push(RoadParams {
            ends: [a, b],
            mean,
            sd,
            kind,
        });
    }
    lines.expect_end()?;
    MineNetwork::routed(
        num_trucks,
        full_slowdown,
        crushers,
        shovels,
        roads,
        num_junctions,
    )
}

fn parse_node(
    line: &Tokens<'_>,
    at: usize,
    num_crushers: usize,
    num_shovels: usize,
    num_junctions: usize,
) -> Result<NodeRef, SimError> {
    let index: usize = line.field(at + 1, "node index")?;
    let (node, limit) = match line.field::<&str>(at, "node tag (c|s|n)")? {
        "c" => (NodeRef::Crusher(CrusherId(index)), num_crushers),
        "s" => (NodeRef::Shovel(ShovelId(index)), num_shovels),
        "n" => (NodeRef::Junction(index), num_junctions),
        _ => return Err(line.error("node tag (c|s|n)")),
    };
    if index >= limit {
        return Err(line.error("node index within bounds"));
    }
    Ok(node)
}

/// Serialize a network back into its input format. Parsing the result yields
/// an equal network.
pub fn write(net: &MineNetwork) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    if net.is_simple() {
        writeln!(out, "T {}", net.num_trucks()).unwrap();
        writeln!(out, "C 1").unwrap();
        let c = net.crusher(CrusherId(0));
        writeln!(out, "{} {}", c.mean, c.sd).unwrap();
        writeln!(out, "S {}", net.num_shovels()).unwrap();
        for s in 0..net.num_shovels() {
            let road = net.road(crate::types::RoadId(s));
            let fill = net.shovel(ShovelId(s));
            writeln!(out, "{} {} {} {}", road.mean, road.sd, fill.mean, fill.sd).unwrap();
        }
    } else {
        writeln!(out, "T {} {}", net.num_trucks(), net.full_slowdown()).unwrap();
        writeln!(out, "C {}", net.num_crushers()).unwrap();
        for c in net.crushers() {
            writeln!(out, "{} {}", c.mean, c.sd).unwrap();
        }
        writeln!(out, "S {}", net.num_shovels()).unwrap();
        for s in net.shovels() {
            writeln!(out, "{} {}", s.mean, s.sd).unwrap();
        }
        writeln!(out, "R {} N {}", net.num_roads(), net.num_junctions()).unwrap();
        for road in net.roads() {
            let tag = |n: &NodeRef| match n {
                NodeRef::Crusher(c) => ("c", c.index()),
                NodeRef::Shovel(s) => ("s", s.index()),
                NodeRef::Junction(j) => ("n", *j),
            };
            let (t1, i1) = tag(&road.ends[0]);
            let (t2, i2) = tag(&road.ends[1]);
            let kind = match road.kind {
                LaneKind::TwoLane => "t",
                LaneKind::OneLane => "o",
            };
            writeln!(
                out,
                "{t1} {i1} {t2} {i2} {} {} {kind}",
                road.mean, road.sd
            )
            .unwrap();
        }
    }
    out
}

/// A tokenized input line.
struct Tokens<'a> {
    line: usize,
    tokens: Vec<&'a str>,
}

impl<'a> Tokens<'a> {
    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn error(&self, expected: &str) -> SimError {
        SimError::Parse {
            line: self.line,
            expected: expected.to_string(),
        }
    }

    fn expect_len(&self, len: usize) -> Result<(), SimError> {
        if self.tokens.len() != len {
            Err(self.error(&format!("{len} whitespace-separated fields")))
        } else {
            Ok(())
        }
    }

    fn field<T: Field<'a>>(&self, at: usize, expected: &str) -> Result<T, SimError> {
        self.tokens
            .get(at)
            .copied()
            .and_then(T::parse)
            .ok_or_else(|| self.error(expected))
    }
}

/// Field types extractable from a token.
trait Field<'a>: Sized {
    fn parse(token: &'a str) -> Option<Self>;
}

impl<'a> Field<'a> for &'a str {
    fn parse(token: &'a str) -> Option<Self> {
        Some(token)
    }
}

impl<'a> Field<'a> for usize {
    fn parse(token: &'a str) -> Option<Self> {
        token.parse().ok()
    }
}

impl<'a> Field<'a> for f64 {
    fn parse(token: &'a str) -> Option<Self> {
        token.parse().ok()
    }
}

/// Line-by-line token reader tracking line numbers for error messages.
struct Lines<'a> {
    iter: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Lines<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            iter: input.lines().enumerate(),
        }
    }

    fn next(&mut self, expected: &str) -> Result<Tokens<'a>, SimError> {
        match self.iter.next() {
            Some((i, line)) => {
                let tokens = line.split_whitespace().collect_vec();
                if tokens.is_empty() {
                    Err(SimError::Parse {
                        line: i + 1,
                        expected: expected.to_string(),
                    })
                } else {
                    Ok(Tokens {
                        line: i + 1,
                        tokens,
                    })
                }
            }
            None => Err(SimError::Parse {
                line: 0,
                expected: format!("{expected} (unexpected end of file)"),
            }),
        }
    }

    /// Only blank lines may remain.
    fn expect_end(&mut self) -> Result<(), SimError> {
        for (i, line) in self.iter.by_ref() {
            if !line.trim().is_empty() {
                return Err(SimError::Parse {
                    line: i + 1,
                    expected: "end of file".to_string(),
                });
            }
        }
        Ok(())
    }

    fn err(&self, expected: &str) -> SimError {
        SimError::Parse {
            line: 1,
            expected: expected.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::RoadId;
    use pretty_assertions::assert_eq;

    const SIMPLE: &str = "T 2\nC 1\n1 0\nS 2\n5 0 2 0\n6 0.5 3 0.5\n";
    const ROUTED: &str = "\
T 4 1.5
C 2
1 0
1.5 0.2
S 2
2 0
3 0.5
R 5 N 1
c 0 n 0 4 0 t
c 1 n 0 5 0.5 t
n 0 s 0 6 0 o
n 0 s 1 7 0 t
c 0 s 1 10 1 o
";

    #[test]
    fn parse_simple_network() {
        let net = parse(SIMPLE).unwrap();
        assert!(net.is_simple());
        assert_eq!(net.num_trucks(), 2);
        assert_eq!(net.num_crushers(), 1);
        assert_eq!(net.num_shovels(), 2);
        assert_eq!(net.num_roads(), 2);
        assert_eq!(net.num_routes(), 2);
        assert_eq!(net.road(RoadId(1)).mean, 6.0);
        assert_eq!(net.shovel(ShovelId(1)).mean, 3.0);
    }

    #[test]
    fn parse_routed_network() {
        let net = parse(ROUTED).unwrap();
        assert!(!net.is_simple());
        assert_eq!(net.num_trucks(), 4);
        assert_eq!(net.full_slowdown(), 1.5);
        assert_eq!(net.num_crushers(), 2);
        assert_eq!(net.num_junctions(), 1);
        // c0: via n0 to s0 and s1, plus the direct one-lane road to s1.
        assert_eq!(net.routes_from_crusher(CrusherId(0)).len(), 3);
        assert_eq!(net.routes_from_crusher(CrusherId(1)).len(), 2);
    }

    #[test]
    fn round_trip_simple() {
        let net = parse(SIMPLE).unwrap();
        assert_eq!(parse(&write(&net)).unwrap(), net);
    }

    #[test]
    fn round_trip_routed() {
        let net = parse(ROUTED).unwrap();
        assert_eq!(parse(&write(&net)).unwrap(), net);
    }

    #[test]
    fn rejects_extra_token() {
        let bad = SIMPLE.replace("5 0 2 0", "5 0 2 0 9");
        assert!(matches!(parse(&bad), Err(SimError::Parse { line: 5, .. })));
    }

    #[test]
    fn rejects_missing_token() {
        let bad = ROUTED.replace("c 0 n 0 4 0 t", "c 0 n 0 4 t");
        assert!(matches!(parse(&bad), Err(SimError::Parse { .. })));
    }

    #[test]
    fn rejects_non_numeric() {
        let bad = SIMPLE.replace("1 0", "one 0");
        assert!(matches!(parse(&bad), Err(SimError::Parse { line: 3, .. })));
    }

    #[test]
    fn rejects_unknown_tag() {
        let bad = ROUTED.replace("c 0 n 0 4 0 t", "x 0 n 0 4 0 t");
        assert!(matches!(parse(&bad), Err(SimError::Parse { .. })));
    }

    #[test]
    fn rejects_trailing_garbage() {
        let bad = format!("{SIMPLE}stray line\n");
        assert!(matches!(parse(&bad), Err(SimError::Parse { line: 7, .. })));
    }

    #[test]
    fn rejects_truncated_file() {
        let bad = "T 2\nC 1\n";
        assert!(matches!(parse(bad), Err(SimError::Parse { .. })));
    }

    #[test]
    fn rejects_wrong_header() {
        assert!(matches!(parse("T 2 1.5 9\n"), Err(SimError::Parse { .. })));
        assert!(matches!(parse("X 2\n"), Err(SimError::Parse { .. })));
    }
}
