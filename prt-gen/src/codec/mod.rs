//! The .prt text format: `L` header, `v`/`f` rows for meshes, one `c` row
//! for environment maps. `#`-prefixed and blank lines are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Vertex position paired with its index, the layout the renderer-facing
/// vertex buffer uses (16 bytes per record).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NumberedVertex {
    pub position: [f32; 3],
    pub index: u32,
}

/// Write a per-vertex transfer file: one `v` row per vertex carrying the
/// position and its `(max_l + 1)^2` coefficients, then one `f` row per
/// triangle. Fails without touching the file when the slice lengths are
/// inconsistent.
pub fn write_mesh_file(
    path: &Path,
    max_l: u32,
    vertices: &[f32],
    coefficients: &[f32],
    indices: &[u32],
) -> Result<(), String> {
    let n_coefficients = ((max_l + 1) * (max_l + 1)) as usize;
    if vertices.is_empty() || vertices.len() % 3 != 0 {
        return Err("vertex data must be non-empty xyz triples".to_string());
    }
    if indices.is_empty() || indices.len() % 3 != 0 {
        return Err("index data must be non-empty triangles".to_string());
    }
    let vertex_count = vertices.len() / 3;
    if coefficients.len() != vertex_count * n_coefficients {
        return Err(format!(
            "expected {} coefficients for {} vertices at max_l {}, got {}",
            vertex_count * n_coefficients,
            vertex_count,
            max_l,
            coefficients.len()
        ));
    }

    let file = File::create(path).map_err(|e| format!("create {:?}: {}", path, e))?;
    let mut out = BufWriter::new(file);
    let io = |e: std::io::Error| format!("write {:?}: {}", path, e);

    writeln!(out, "L {}", max_l).map_err(io)?;
    for i in 0..vertex_count {
        write!(out, "v").map_err(io)?;
        for j in 0..3 {
            write!(out, " {}", vertices[3 * i + j]).map_err(io)?;
        }
        for j in 0..n_coefficients {
            write!(out, " {}", coefficients[i * n_coefficients + j]).map_err(io)?;
        }
        writeln!(out).map_err(io)?;
    }
    for t in 0..indices.len() / 3 {
        writeln!(out, "f {} {} {}", indices[3 * t], indices[3 * t + 1], indices[3 * t + 2])
            .map_err(io)?;
    }
    out.flush().map_err(io)
}

/// Write an environment-map file: the `L` header and a single `c` row of
/// `3 * (max_l + 1)^2` interleaved RGB coefficients.
pub fn write_em_file(path: &Path, max_l: u32, coefficients: &[f32]) -> Result<(), String> {
    let expected = 3 * ((max_l + 1) * (max_l + 1)) as usize;
    if coefficients.len() != expected {
        return Err(format!(
            "expected {} coefficients at max_l {}, got {}",
            expected,
            max_l,
            coefficients.len()
        ));
    }

    let file = File::create(path).map_err(|e| format!("create {:?}: {}", path, e))?;
    let mut out = BufWriter::new(file);
    let io = |e: std::io::Error| format!("write {:?}: {}", path, e);

    writeln!(out, "L {}", max_l).map_err(io)?;
    write!(out, "c").map_err(io)?;
    for c in coefficients {
        write!(out, " {}", c).map_err(io)?;
    }
    writeln!(out).map_err(io)?;
    out.flush().map_err(io)
}

/// Stateful .prt loader. Accessors fail until a load succeeds; a failed load
/// leaves the reader unloaded with no partial data.
#[derive(Default)]
pub struct PrtReader {
    max_l: u32,
    n_coefficients: usize,
    vertices: Vec<f32>,
    indices: Vec<u32>,
    coefficients: Vec<f32>,
    numbered: Vec<NumberedVertex>,
    max_l_found: bool,
    loaded: bool,
}

impl PrtReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a per-vertex transfer file (`v`/`f` rows).
    pub fn load_mesh(&mut self, path: &Path) -> Result<(), String> {
        self.load(path, false)
    }

    /// Load an environment-map file (single `c` row).
    pub fn load_em(&mut self, path: &Path) -> Result<(), String> {
        self.load(path, true)
    }

    fn load(&mut self, path: &Path, is_em: bool) -> Result<(), String> {
        *self = Self::default();

        let file = File::open(path).map_err(|e| format!("open {:?}: {}", path, e))?;
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| format!("read {:?}: {}", path, e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut tokens = trimmed.split_whitespace();
            let specifier = tokens.next().unwrap();
            let rest: Vec<&str> = tokens.collect();
            self.process_line(specifier, &rest, is_em).map_err(|e| {
                *self = Self::default();
                format!("{:?} line {}: {}", path, lineno + 1, e)
            })?;
        }

        let check = if is_em {
            self.check_em()
        } else {
            self.check_mesh()
        };
        if let Err(e) = check {
            *self = Self::default();
            return Err(format!("{:?}: {}", path, e));
        }
        self.loaded = true;
        Ok(())
    }

    fn process_line(&mut self, specifier: &str, line: &[&str], is_em: bool) -> Result<(), String> {
        match specifier {
            "L" => {
                if self.max_l_found || line.len() != 1 {
                    return Err("malformed L line".to_string());
                }
                self.max_l = line[0]
                    .parse()
                    .map_err(|_| format!("bad max_l token {:?}", line[0]))?;
                self.n_coefficients = ((self.max_l + 1) * (self.max_l + 1)) as usize;
                self.max_l_found = true;
            }
            "v" if !is_em => self.set_vertex(line)?,
            "f" if !is_em => self.set_index(line)?,
            "c" if is_em => self.set_em_coefficients(line)?,
            // Unknown specifiers are skipped, like comments.
            _ => {}
        }
        Ok(())
    }

    fn set_vertex(&mut self, line: &[&str]) -> Result<(), String> {
        if !self.max_l_found {
            return Err("v line before L line".to_string());
        }
        if line.len() != 3 + self.n_coefficients {
            return Err(format!(
                "v line has {} tokens, expected {}",
                line.len(),
                3 + self.n_coefficients
            ));
        }
        for tok in &line[..3] {
            self.vertices
                .push(tok.parse().map_err(|_| format!("bad vertex token {:?}", tok))?);
        }
        for tok in &line[3..] {
            self.coefficients
                .push(tok.parse().map_err(|_| format!("bad coefficient token {:?}", tok))?);
        }
        Ok(())
    }

    fn set_index(&mut self, line: &[&str]) -> Result<(), String> {
        if !self.max_l_found {
            return Err("f line before L line".to_string());
        }
        if line.len() != 3 {
            return Err(format!("f line has {} tokens, expected 3", line.len()));
        }
        for tok in line {
            self.indices
                .push(tok.parse().map_err(|_| format!("bad index token {:?}", tok))?);
        }
        Ok(())
    }

    fn set_em_coefficients(&mut self, line: &[&str]) -> Result<(), String> {
        if !self.max_l_found {
            return Err("c line before L line".to_string());
        }
        if line.len() != 3 * self.n_coefficients {
            return Err(format!(
                "c line has {} tokens, expected {}",
                line.len(),
                3 * self.n_coefficients
            ));
        }
        for tok in line {
            self.coefficients
                .push(tok.parse().map_err(|_| format!("bad coefficient token {:?}", tok))?);
        }
        Ok(())
    }

    fn check_em(&self) -> Result<(), String> {
        if !self.max_l_found {
            return Err("missing L line".to_string());
        }
        if self.coefficients.len() != 3 * self.n_coefficients {
            return Err("missing coefficient line".to_string());
        }
        Ok(())
    }

    fn check_mesh(&self) -> Result<(), String> {
        if !self.max_l_found {
            return Err("missing L line".to_string());
        }
        if self.vertices.is_empty() || self.vertices.len() % 3 != 0 {
            return Err("no vertex data".to_string());
        }
        if self.indices.is_empty() {
            return Err("no index data".to_string());
        }
        if self.coefficients.len() != self.n_coefficients * self.vertices.len() / 3 {
            return Err("coefficient count does not match vertex count".to_string());
        }
        Ok(())
    }

    fn require_loaded(&self) -> Result<(), String> {
        if self.loaded {
            Ok(())
        } else {
            Err("prt file is not loaded".to_string())
        }
    }

    pub fn max_l(&self) -> Result<u32, String> {
        self.require_loaded()?;
        Ok(self.max_l)
    }

    pub fn n_coefficients(&self) -> Result<usize, String> {
        self.require_loaded()?;
        Ok(self.n_coefficients)
    }

    pub fn vertices(&self) -> Result<&[f32], String> {
        self.require_loaded()?;
        Ok(&self.vertices)
    }

    pub fn indices(&self) -> Result<&[u32], String> {
        self.require_loaded()?;
        Ok(&self.indices)
    }

    pub fn coefficients(&self) -> Result<&[f32], String> {
        self.require_loaded()?;
        Ok(&self.coefficients)
    }

    /// Position + vertex-index records, built lazily on first access.
    pub fn numbered_vertices(&mut self) -> Result<&[NumberedVertex], String> {
        self.require_loaded()?;
        if self.numbered.is_empty() {
            self.numbered = self
                .vertices
                .chunks_exact(3)
                .enumerate()
                .map(|(i, v)| NumberedVertex {
                    position: [v[0], v[1], v[2]],
                    index: i as u32,
                })
                .collect();
        }
        Ok(&self.numbered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("prt_gen_codec_{}_{}", std::process::id(), name))
    }

    #[test]
    fn mesh_round_trip() {
        let path = temp_path("mesh.prt");
        let vertices = [0.0f32, 0.5, 1.0, -1.0, 2.25, 0.125, 3.0, -0.75, 0.0];
        let indices = [0u32, 1, 2];
        // max_l = 1 -> 4 coefficients per vertex.
        let coefficients: Vec<f32> = (0..12).map(|i| i as f32 * 0.3125 - 1.0).collect();
        write_mesh_file(&path, 1, &vertices, &coefficients, &indices).unwrap();

        let mut reader = PrtReader::new();
        reader.load_mesh(&path).unwrap();
        assert_eq!(reader.max_l().unwrap(), 1);
        assert_eq!(reader.vertices().unwrap(), &vertices);
        assert_eq!(reader.indices().unwrap(), &indices);
        assert_eq!(reader.coefficients().unwrap(), &coefficients[..]);

        let numbered = reader.numbered_vertices().unwrap();
        assert_eq!(numbered.len(), 3);
        assert_eq!(numbered[2].position, [3.0, -0.75, 0.0]);
        assert_eq!(numbered[2].index, 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn em_round_trip() {
        let path = temp_path("em.prt");
        let coefficients: Vec<f32> = (0..3).map(|i| 0.25 + i as f32).collect();
        write_em_file(&path, 0, &coefficients).unwrap();

        let mut reader = PrtReader::new();
        reader.load_em(&path).unwrap();
        assert_eq!(reader.max_l().unwrap(), 0);
        assert_eq!(reader.coefficients().unwrap(), &coefficients[..]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let path = temp_path("comments.prt");
        std::fs::write(&path, "# header\n\nL 0\n# body\nc 1 2 3\n").unwrap();
        let mut reader = PrtReader::new();
        reader.load_em(&path).unwrap();
        assert_eq!(reader.coefficients().unwrap(), &[1.0, 2.0, 3.0]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_header_fails_and_stays_unloaded() {
        let path = temp_path("no_header.prt");
        std::fs::write(&path, "v 0 0 0 1\nf 0 0 0\n").unwrap();
        let mut reader = PrtReader::new();
        assert!(reader.load_mesh(&path).is_err());
        let err = reader.vertices().unwrap_err();
        assert!(err.contains("not loaded"), "unexpected error: {}", err);
        assert!(reader.coefficients().is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn duplicate_header_fails() {
        let path = temp_path("dup_header.prt");
        std::fs::write(&path, "L 0\nL 0\nc 1 2 3\n").unwrap();
        let mut reader = PrtReader::new();
        assert!(reader.load_em(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn wrong_coefficient_count_fails() {
        let path = temp_path("short_row.prt");
        // max_l = 1 wants 4 coefficients per vertex; row carries 2.
        std::fs::write(&path, "L 1\nv 0 0 0 1 2\nf 0 0 0\n").unwrap();
        let mut reader = PrtReader::new();
        assert!(reader.load_mesh(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn writer_rejects_inconsistent_slices() {
        let path = temp_path("unwritten.prt");
        let err = write_mesh_file(&path, 1, &[0.0; 3], &[0.0; 3], &[0, 1, 2]).unwrap_err();
        assert!(err.contains("expected 4 coefficients"), "{}", err);
        assert!(!path.exists());
        assert!(write_em_file(&path, 0, &[0.0; 2]).is_err());
        assert!(!path.exists());
    }
}
