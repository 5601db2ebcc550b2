//! Read-only particle database: `micrographs(ID, Voltage, Cs)` and
//! `particles(ID, Name, GroupID, micrographID, DefocusU, DefocusV,
//! DefocusAngle)`, queried via prepared statements.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{EmError, Result};

#[derive(Clone, Copy, Debug)]
pub struct MicrographRow {
    pub id: u32,
    pub voltage: f64,
    pub cs: f64,
}

#[derive(Clone, Debug)]
pub struct ParticleRow {
    pub id: u32,
    /// Either a bare file path, or `k@path` selecting 1-based slice `k`
    /// of a multi-image stack.
    pub name: String,
    pub group_id: u32,
    pub micrograph_id: u32,
    pub defocus_u: f64,
    pub defocus_v: f64,
    pub defocus_angle: f64,
}

/// A parsed `Name` column: either a bare path, or `k@path` selecting
/// (1-based) slice `k` of a multi-image file.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleLocation {
    pub path: String,
    pub slice: Option<usize>,
}

pub fn parse_particle_name(name: &str) -> ParticleLocation {
    match name.split_once('@') {
        Some((k, path)) => match k.parse::<usize>() {
            Ok(slice) if slice >= 1 => ParticleLocation {
                path: path.to_string(),
                slice: Some(slice - 1),
            },
            _ => ParticleLocation {
                path: name.to_string(),
                slice: None,
            },
        },
        None => ParticleLocation {
            path: name.to_string(),
            slice: None,
        },
    }
}

pub struct ParticleDb {
    conn: Connection,
}

impl ParticleDb {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn micrograph(&self, id: u32) -> Result<MicrographRow> {
        self.conn
            .query_row(
                "SELECT ID, Voltage, Cs FROM micrographs WHERE ID = ?1",
                [id],
                |row| {
                    Ok(MicrographRow {
                        id: row.get(0)?,
                        voltage: row.get(1)?,
                        cs: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or(EmError::MissingParticle(id))
    }

    pub fn particle(&self, id: u32) -> Result<ParticleRow> {
        self.conn
            .query_row(
                "SELECT ID, Name, GroupID, micrographID, DefocusU, DefocusV, DefocusAngle \
                 FROM particles WHERE ID = ?1",
                [id],
                |row| {
                    Ok(ParticleRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        group_id: row.get(2)?,
                        micrograph_id: row.get(3)?,
                        defocus_u: row.get(4)?,
                        defocus_v: row.get(5)?,
                        defocus_angle: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or(EmError::MissingParticle(id))
    }

    /// All particle IDs, in ascending order (the set the master rank
    /// broadcasts and scatters to the two hemispheres).
    pub fn all_particle_ids(&self) -> Result<Vec<u32>> {
        let mut stmt = self.conn.prepare("SELECT ID FROM particles ORDER BY ID")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, u32>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn group_count(&self) -> Result<u32> {
        self.conn
            .query_row("SELECT COUNT(DISTINCT GroupID) FROM particles", [], |row| row.get(0))
            .map_err(EmError::from)
    }
}

/// Disjoint-scatter the given particle IDs across the two hemispheres by
/// alternating assignment, so hemisphere membership does not correlate
/// with acquisition order.
pub fn scatter_to_hemispheres(ids: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut a = Vec::with_capacity(ids.len() / 2 + 1);
    let mut b = Vec::with_capacity(ids.len() / 2);
    for (i, &id) in ids.iter().enumerate() {
        if i % 2 == 0 {
            a.push(id);
        } else {
            b.push(id);
        }
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_path_has_no_slice() {
        let loc = parse_particle_name("/data/particle_0001.mrc");
        assert_eq!(loc.slice, None);
        assert_eq!(loc.path, "/data/particle_0001.mrc");
    }

    #[test]
    fn parse_slice_selector_is_zero_based() {
        let loc = parse_particle_name("3@/data/stack.mrcs");
        assert_eq!(loc.slice, Some(2));
        assert_eq!(loc.path, "/data/stack.mrcs");
    }

    #[test]
    fn scatter_is_disjoint_and_covers_every_id() {
        let ids: Vec<u32> = (1..=101).collect();
        let (a, b) = scatter_to_hemispheres(&ids);
        assert_eq!(a.len() + b.len(), ids.len());
        let mut all: Vec<u32> = a.iter().chain(b.iter()).cloned().collect();
        all.sort_unstable();
        assert_eq!(all, ids);
    }

    #[test]
    fn open_and_query_in_memory_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE micrographs (ID INTEGER, Voltage REAL, Cs REAL);
             CREATE TABLE particles (ID INTEGER, Name TEXT, GroupID INTEGER,
                                      micrographID INTEGER, DefocusU REAL,
                                      DefocusV REAL, DefocusAngle REAL);
             INSERT INTO micrographs VALUES (1, 300000.0, 2700000.0);
             INSERT INTO particles VALUES (1, '1@stack.mrcs', 1, 1, 10000.0, 9800.0, 0.1);",
        )
        .unwrap();
        let db = ParticleDb { conn };
        let m = db.micrograph(1).unwrap();
        assert_eq!(m.id, 1);
        let p = db.particle(1).unwrap();
        assert_eq!(p.group_id, 1);
        assert!(db.particle(99).is_err());
    }
}
