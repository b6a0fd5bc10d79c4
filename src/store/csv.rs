use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Business, PendingWrite, RepairStore, Review, ReviewNeighbor, StoreError};
use crate::semantic::{content_hash, EmbeddingSpace, VectorIndex, VectorStorage};

pub const BUSINESSES_FILE: &str = "businesses.csv";
pub const REVIEWS_FILE: &str = "reviews.csv";
pub const VECTORS_FILE: &str = "vectors.bin";

const BUSINESS_HEADERS: [&str; 12] = [
    "business_id",
    "name",
    "address",
    "city",
    "state",
    "postal_code",
    "latitude",
    "longitude",
    "stars",
    "review_count",
    "past_businesses",
    "best_business",
];

const REVIEW_HEADERS: [&str; 6] = [
    "review_id",
    "business_id",
    "stars",
    "text",
    "date",
    "fault_type",
];

/// File-backed store: two CSV tables plus `vectors.bin`, all kept in memory.
///
/// Every file is rewritten through a temp file and a rename, so readers never
/// see a half-written table.
#[derive(Debug)]
pub struct BackendCsv {
    dir: PathBuf,
    state: RwLock<State>,
}

#[derive(Debug)]
struct State {
    businesses: Vec<Business>,
    reviews: Vec<Review>,
    business_pos: HashMap<String, usize>,
    review_pos: HashMap<String, usize>,
    vectors: Option<(EmbeddingSpace, VectorIndex)>,
}

impl BackendCsv {
    /// Open the store in `dir`, creating empty tables if they are missing.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;

        let now = Instant::now();
        let businesses: Vec<Business> = read_csv(&dir.join(BUSINESSES_FILE), &BUSINESS_HEADERS)?;
        let reviews: Vec<Review> = read_csv(&dir.join(REVIEWS_FILE), &REVIEW_HEADERS)?;

        let business_pos = positions(businesses.iter().map(|b| b.business_id.as_str()), BUSINESSES_FILE)?;
        let review_pos = positions(reviews.iter().map(|r| r.review_id.as_str()), REVIEWS_FILE)?;

        let storage = VectorStorage::new(dir.join(VECTORS_FILE));
        let vectors = if storage.exists() {
            let (space, mut index) = storage.load()?;
            let stale: Vec<String> = index
                .iter()
                .filter(|(id, _)| !review_pos.contains_key(*id))
                .map(|(id, _)| id.to_string())
                .collect();
            for id in &stale {
                index.remove(id);
            }
            if !stale.is_empty() {
                log::debug!("ignoring {} vectors of reviews no longer present", stale.len());
            }
            Some((space, index))
        } else {
            None
        };

        log::debug!(
            "took {}ms to read {} businesses, {} reviews",
            now.elapsed().as_micros() as f64 / 1000.0,
            businesses.len(),
            reviews.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            state: RwLock::new(State {
                businesses,
                reviews,
                business_pos,
                review_pos,
                vectors,
            }),
        })
    }

    /// Write the given tables into `dir` and open a store on them.
    #[cfg(test)]
    pub fn seed(dir: &Path, businesses: &[Business], reviews: &[Review]) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        write_csv(&dir.join(BUSINESSES_FILE), &BUSINESS_HEADERS, businesses)?;
        write_csv(&dir.join(REVIEWS_FILE), &REVIEW_HEADERS, reviews)?;
        Self::load(dir)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    /// Write every touched file to a temp sibling. On failure nothing is left behind.
    fn stage(
        &self,
        businesses: Option<&[Business]>,
        reviews: Option<&[Review]>,
        vectors: Option<&(EmbeddingSpace, VectorIndex)>,
    ) -> Result<Vec<(PathBuf, PathBuf)>, StoreError> {
        let mut staged: Vec<(PathBuf, PathBuf)> = vec![];

        let result = (|| -> Result<(), StoreError> {
            if let Some(businesses) = businesses {
                let target = self.dir.join(BUSINESSES_FILE);
                let temp = temp_path(&target);
                staged.push((temp.clone(), target));
                write_csv(&temp, &BUSINESS_HEADERS, businesses)?;
            }
            if let Some(reviews) = reviews {
                let target = self.dir.join(REVIEWS_FILE);
                let temp = temp_path(&target);
                staged.push((temp.clone(), target));
                write_csv(&temp, &REVIEW_HEADERS, reviews)?;
            }
            if let Some((space, index)) = vectors {
                let target = self.dir.join(VECTORS_FILE);
                let temp = VectorStorage::new(target.clone()).stage(index, space)?;
                staged.push((temp, target));
            }
            Ok(())
        })();

        if let Err(err) = result {
            for (temp, _) in &staged {
                let _ = std::fs::remove_file(temp);
            }
            return Err(err);
        }

        Ok(staged)
    }
}

impl RepairStore for BackendCsv {
    fn businesses(&self) -> Result<Vec<Business>, StoreError> {
        Ok(self.read()?.businesses.clone())
    }

    fn businesses_by_ids(&self, ids: &[String]) -> Result<Vec<Business>, StoreError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .read()?
            .businesses
            .iter()
            .filter(|b| wanted.contains(b.business_id.as_str()))
            .cloned()
            .collect())
    }

    fn business_ids_by_best_fault(&self, category: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read()?
            .businesses
            .iter()
            .filter(|b| b.best_business.as_deref() == Some(category))
            .map(|b| b.business_id.clone())
            .collect())
    }

    fn reviews(&self) -> Result<Vec<Review>, StoreError> {
        Ok(self.read()?.reviews.clone())
    }

    fn reviews_missing_embedding(&self) -> Result<Vec<Review>, StoreError> {
        let state = self.read()?;
        let index = state.vectors.as_ref().map(|(_, index)| index);
        Ok(state
            .reviews
            .iter()
            .filter(|review| match index.and_then(|i| i.get(&review.review_id)) {
                Some(entry) => entry.content_hash != content_hash(&review.text),
                None => true,
            })
            .cloned()
            .collect())
    }

    fn embedding_space(&self) -> Result<Option<EmbeddingSpace>, StoreError> {
        Ok(self.read()?.vectors.as_ref().map(|(space, _)| *space))
    }

    fn nearest_reviews(&self, query: &[f32], k: usize) -> Result<Vec<ReviewNeighbor>, StoreError> {
        let state = self.read()?;
        let Some((_, index)) = state.vectors.as_ref() else {
            return Ok(vec![]);
        };

        let neighbors = index
            .nearest(query, k)?
            .into_iter()
            .filter_map(|n| {
                let review = &state.reviews[*state.review_pos.get(&n.id)?];
                Some(ReviewNeighbor {
                    business_id: review.business_id.clone(),
                    review_id: n.id,
                    distance: n.distance,
                })
            })
            .collect();
        Ok(neighbors)
    }

    fn apply(&self, writes: &[PendingWrite]) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;

        // Copy-on-write: only the tables a batch touches are cloned and rewritten.
        let mut businesses: Option<Vec<Business>> = None;
        let mut reviews: Option<Vec<Review>> = None;
        let mut vectors: Option<Option<(EmbeddingSpace, VectorIndex)>> = None;

        for write in writes {
            match write {
                PendingWrite::ReviewFault {
                    review_id,
                    fault_type,
                } => {
                    let pos = *state
                        .review_pos
                        .get(review_id)
                        .ok_or_else(|| StoreError::UnknownReview(review_id.clone()))?;
                    let reviews = reviews.get_or_insert_with(|| state.reviews.clone());
                    reviews[pos].fault_type = fault_type.clone();
                }
                PendingWrite::BusinessStats {
                    business_id,
                    past_businesses,
                    best_business,
                } => {
                    let pos = *state
                        .business_pos
                        .get(business_id)
                        .ok_or_else(|| StoreError::UnknownBusiness(business_id.clone()))?;
                    let businesses = businesses.get_or_insert_with(|| state.businesses.clone());
                    if let Some(past) = past_businesses {
                        businesses[pos].past_businesses = Some(past.clone());
                    }
                    if let Some(best) = best_business {
                        businesses[pos].best_business = Some(best.clone());
                    }
                }
                PendingWrite::ReviewEmbedding {
                    review_id,
                    content_hash,
                    vector,
                } => {
                    if !state.review_pos.contains_key(review_id) {
                        return Err(StoreError::UnknownReview(review_id.clone()));
                    }
                    let (_, index) = vectors
                        .get_or_insert_with(|| state.vectors.clone())
                        .as_mut()
                        .ok_or(StoreError::NoEmbeddingSpace)?;
                    index.insert(review_id, *content_hash, vector.clone())?;
                }
                PendingWrite::ResetEmbeddings(space) => {
                    vectors = Some(Some((*space, VectorIndex::new(space.dimensions))));
                }
            }
        }

        let staged = self.stage(
            businesses.as_deref(),
            reviews.as_deref(),
            vectors.as_ref().and_then(|v| v.as_ref()),
        )?;
        for (temp, target) in &staged {
            std::fs::rename(temp, target)?;
        }

        if let Some(businesses) = businesses {
            state.businesses = businesses;
        }
        if let Some(reviews) = reviews {
            state.reviews = reviews;
        }
        if let Some(vectors) = vectors {
            state.vectors = vectors;
        }

        log::debug!("applied {} writes", writes.len());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("-tmp");
    PathBuf::from(name)
}

/// Row position per id. A repeated id is an error: writes address rows by id.
fn positions<'a>(
    ids: impl Iterator<Item = &'a str>,
    table: &'static str,
) -> Result<HashMap<String, usize>, StoreError> {
    let mut map = HashMap::new();
    for (pos, id) in ids.enumerate() {
        if map.insert(id.to_string(), pos).is_some() {
            return Err(StoreError::DuplicateId {
                table,
                id: id.to_string(),
            });
        }
    }
    Ok(map)
}

fn read_csv<T: DeserializeOwned>(path: &Path, headers: &[&str]) -> Result<Vec<T>, StoreError> {
    if let Err(err) = std::fs::metadata(path) {
        match err.kind() {
            ErrorKind::NotFound => {
                log::info!("Creating empty table at {}", path.display());
                write_csv::<()>(path, headers, &[])?;
            }
            _ => return Err(err.into()),
        }
    }

    let mut reader = ::csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

fn write_csv<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<(), StoreError> {
    let mut writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
