use mr_types::ContainerName;

/// What deleting a record does to records in other containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cascade {
    /// Leave other containers alone.
    None,
    /// Delete every record this one links to in the given container.
    DeleteLinked(ContainerName),
    /// Remove this record's name from the link maps of the given containers.
    Unlink(&'static [ContainerName]),
}

/// Per-type rules for [`ContainerRepository`](crate::ContainerRepository).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypePolicy {
    pub container: ContainerName,
    /// Fields `update_obj` may assign.
    pub whitelist: &'static [&'static str],
    pub cascade: Cascade,
}

const COMPANY_FIELDS: &[&str] = &[
    "description",
    "role",
    "company_type",
    "region",
    "industry",
    "industry_code",
    "industry_group_code",
    "industry_group_description",
    "major_group_code",
    "major_group_description",
    "url",
    "logo_url",
    "wikipedia_url",
    "street_address",
    "city",
    "state_province",
    "country",
    "zip_postal",
    "latitude",
    "longitude",
    "phone",
    "cik",
    "stock_symbol",
    "stock_exchange",
    "recent10k_url",
    "recent10q_url",
    "firmographics_url",
    "filings_url",
    "owner_transactions",
    "google_maps_url",
    "google_news_url",
    "google_finance_url",
    "google_patents_url",
    "status",
    "tags",
    "quadrant",
];

const INTERACTION_FIELDS: &[&str] = &[
    "description",
    "interaction_type",
    "status",
    "content_type",
    "file_size",
    "reading_time",
    "word_count",
    "page_count",
    "abstract",
    "summary",
    "tags",
    "topics",
    "url",
    "street_address",
    "city",
    "state_province",
    "country",
    "zip_postal",
    "latitude",
    "longitude",
    "public",
    "contact_name",
    "contact_email",
    "contact_phone",
    "contact_linkedin",
    "contact_twitter",
];

const STUDY_FIELDS: &[&str] = &["description", "status", "public"];

const INTERACTION_REFERRERS: &[ContainerName] = &[ContainerName::Companies, ContainerName::Studies];

impl TypePolicy {
    /// The stock policy for a container.
    pub fn for_container(container: ContainerName) -> Self {
        match container {
            ContainerName::Companies => Self {
                container,
                whitelist: COMPANY_FIELDS,
                cascade: Cascade::DeleteLinked(ContainerName::Interactions),
            },
            ContainerName::Interactions => Self {
                container,
                whitelist: INTERACTION_FIELDS,
                cascade: Cascade::Unlink(INTERACTION_REFERRERS),
            },
            ContainerName::Studies => Self {
                container,
                whitelist: STUDY_FIELDS,
                cascade: Cascade::None,
            },
        }
    }

    pub fn allows(&self, field: &str) -> bool {
        self.whitelist.iter().any(|allowed| *allowed == field)
    }

    /// Containers a delete must catch besides the primary one.
    pub fn cascade_targets(&self) -> &[ContainerName] {
        match &self.cascade {
            Cascade::None => &[],
            Cascade::DeleteLinked(target) => std::slice::from_ref(target),
            Cascade::Unlink(targets) => targets,
        }
    }
}
