//! All-ranks schema agreement check run before any rank commits to the
//! multi-rank exchange handshake.
//!
//! Rank 0 broadcasts its attribute schema (types, component counts, and
//! array names); every other rank votes agree/disagree (a structurally
//! empty mesh always agrees — it has no shape to conflict); rank 0
//! broadcasts the final decision. Disagreement is not an error: the
//! orchestrator degrades to a safe structural copy. The point of paying
//! for this round-trip is to never leave N-1 ranks blocked in a receive
//! that an errored-out rank will never match.
//!
//! The broadcast schema is also returned to the caller: a structurally
//! empty rank has no arrays of its own to shape its output, so it builds
//! them from rank 0's schema.

use crate::comm::Communicator;
use crate::error::RedistError;
use crate::mesh::Mesh;
use crate::mesh::attributes::ScalarType;
use crate::redist::wire::{
    TAG_SCHEMA_BODY, TAG_SCHEMA_DECISION, TAG_SCHEMA_HDR, TAG_SCHEMA_NAMES, TAG_SCHEMA_VOTE,
    WireArraySchema, WireSchemaHdr, cast_slice, expect_exact_len, read_pod, read_pod_vec,
};

const AGREE: u8 = 1;
const DISAGREE: u8 = 0;

/// One array's slot in the broadcast schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayTemplate {
    pub name: String,
    pub scalar: ScalarType,
    pub components: usize,
}

/// Rank 0's attribute schema as every rank saw it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaTemplate {
    pub point_arrays: Vec<ArrayTemplate>,
    pub cell_arrays: Vec<ArrayTemplate>,
}

impl SchemaTemplate {
    pub fn of(mesh: &Mesh) -> Self {
        let slot = |set: &crate::mesh::attributes::AttributeSet| {
            set.iter()
                .map(|a| ArrayTemplate {
                    name: a.name.clone(),
                    scalar: a.scalar_type(),
                    components: a.components,
                })
                .collect()
        };
        Self {
            point_arrays: slot(&mesh.point_data),
            cell_arrays: slot(&mesh.cell_data),
        }
    }

    fn records(&self) -> Vec<WireArraySchema> {
        self.point_arrays
            .iter()
            .chain(self.cell_arrays.iter())
            .map(|a| WireArraySchema::new(a.scalar.to_wire(), a.components as u32))
            .collect()
    }

    /// Length-prefixed UTF-8 names, point arrays then cell arrays.
    fn name_blob(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        for a in self.point_arrays.iter().chain(self.cell_arrays.iter()) {
            blob.extend_from_slice(&(a.name.len() as u32).to_le_bytes());
            blob.extend_from_slice(a.name.as_bytes());
        }
        blob
    }

    /// Positional shape comparison; names are not part of the schema.
    fn same_shape(&self, other: &SchemaTemplate) -> bool {
        let shape = |v: &[ArrayTemplate]| {
            v.iter()
                .map(|a| (a.scalar, a.components))
                .collect::<Vec<_>>()
        };
        shape(&self.point_arrays) == shape(&other.point_arrays)
            && shape(&self.cell_arrays) == shape(&other.cell_arrays)
    }
}

fn decode_names(blob: &[u8], n: usize) -> Result<Vec<String>, String> {
    let mut names = Vec::with_capacity(n);
    let mut pos = 0;
    for _ in 0..n {
        let len_bytes = blob
            .get(pos..pos + 4)
            .ok_or_else(|| format!("name blob truncated at byte {pos}"))?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        pos += 4;
        let raw = blob
            .get(pos..pos + len)
            .ok_or_else(|| format!("name blob truncated at byte {pos}"))?;
        pos += len;
        names.push(String::from_utf8(raw.to_vec()).map_err(|_| "name is not UTF-8".to_string())?);
    }
    if pos != blob.len() {
        return Err(format!("name blob has {} trailing bytes", blob.len() - pos));
    }
    Ok(names)
}

/// Result of the schema precheck on one rank. `agree` is identical on
/// every rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Precheck {
    pub agree: bool,
    pub template: SchemaTemplate,
}

fn comm_err(neighbor: usize, what: &str) -> RedistError {
    RedistError::CommError {
        neighbor,
        detail: format!("schema precheck: {what}"),
    }
}

/// Run the collective schema check. All ranks must call this together;
/// `Err` is reserved for transport failures and malformed schema
/// records, not for disagreement.
pub fn schemas_agree<C: Communicator>(mesh: &Mesh, comm: &C) -> Result<Precheck, RedistError> {
    let n_ranks = comm.size();
    if n_ranks <= 1 {
        return Ok(Precheck {
            agree: true,
            template: SchemaTemplate::of(mesh),
        });
    }

    if comm.rank() == 0 {
        let template = SchemaTemplate::of(mesh);
        let hdr = WireSchemaHdr::new(template.point_arrays.len(), template.cell_arrays.len());
        let body = template.records();
        let names = template.name_blob();
        for peer in 1..n_ranks {
            comm.send(peer, TAG_SCHEMA_HDR, cast_slice(std::slice::from_ref(&hdr)));
            comm.send(peer, TAG_SCHEMA_BODY, cast_slice(&body));
            comm.send(peer, TAG_SCHEMA_NAMES, &names);
        }
        let mut agree = true;
        for peer in 1..n_ranks {
            let vote = comm
                .recv(peer, TAG_SCHEMA_VOTE, 1)
                .ok_or_else(|| comm_err(peer, "missing vote"))?;
            expect_exact_len(vote.len(), 1).map_err(|e| comm_err(peer, &format!("vote: {e}")))?;
            agree &= vote[0] == AGREE;
        }
        let decision = if agree { AGREE } else { DISAGREE };
        for peer in 1..n_ranks {
            comm.send(peer, TAG_SCHEMA_DECISION, &[decision]);
        }
        Ok(Precheck { agree, template })
    } else {
        let hdr_bytes = comm
            .recv(0, TAG_SCHEMA_HDR, std::mem::size_of::<WireSchemaHdr>())
            .ok_or_else(|| comm_err(0, "missing header"))?;
        expect_exact_len(hdr_bytes.len(), std::mem::size_of::<WireSchemaHdr>())
            .map_err(|e| comm_err(0, &format!("header: {e}")))?;
        let hdr: WireSchemaHdr = read_pod(&hdr_bytes);
        let n_points = hdr.point_arrays();
        let n_records = n_points + hdr.cell_arrays();

        let body_bytes = comm
            .recv(0, TAG_SCHEMA_BODY, n_records * std::mem::size_of::<WireArraySchema>())
            .ok_or_else(|| comm_err(0, "missing body"))?;
        expect_exact_len(body_bytes.len(), n_records * std::mem::size_of::<WireArraySchema>())
            .map_err(|e| comm_err(0, &format!("body: {e}")))?;
        let records: Vec<WireArraySchema> = read_pod_vec(&body_bytes);

        let name_bytes = comm
            .recv(0, TAG_SCHEMA_NAMES, 0)
            .ok_or_else(|| comm_err(0, "missing names"))?;
        let names = decode_names(&name_bytes, n_records)
            .map_err(|e| comm_err(0, &format!("names: {e}")))?;

        let mut arrays = Vec::with_capacity(n_records);
        for (rec, name) in records.iter().zip(names) {
            let scalar = ScalarType::from_wire(rec.scalar_code())
                .ok_or_else(|| comm_err(0, "unknown scalar code in schema"))?;
            arrays.push(ArrayTemplate {
                name,
                scalar,
                components: rec.components() as usize,
            });
        }
        let cell_arrays = arrays.split_off(n_points);
        let template = SchemaTemplate {
            point_arrays: arrays,
            cell_arrays,
        };

        let vote = if mesh.is_structurally_empty() || SchemaTemplate::of(mesh).same_shape(&template)
        {
            AGREE
        } else {
            DISAGREE
        };
        comm.send(0, TAG_SCHEMA_VOTE, &[vote]);

        let decision = comm
            .recv(0, TAG_SCHEMA_DECISION, 1)
            .ok_or_else(|| comm_err(0, "missing decision"))?;
        expect_exact_len(decision.len(), 1)
            .map_err(|e| comm_err(0, &format!("decision: {e}")))?;
        Ok(Precheck {
            agree: decision[0] == AGREE,
            template,
        })
    }
}
