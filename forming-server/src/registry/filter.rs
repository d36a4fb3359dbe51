use jiff::civil::Date;

/// Sentinel the dashboard sends for "no constraint" on prefix or status.
pub const ALL: &str = "all";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortMode {
    #[default]
    Newest,
    WeightAsc,
    WeightDesc,
}

impl SortMode {
    /// Maps the dashboard's `sort` parameter. Anything unrecognised falls
    /// back to newest-first.
    pub fn from_param(param: &str) -> Self {
        match param {
            "weight_asc" => SortMode::WeightAsc,
            "weight_desc" => SortMode::WeightDesc,
            _ => SortMode::Newest,
        }
    }
}

/// What the dashboard asks for. Every field is optional; a missing field
/// does not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// First day included.
    pub start: Option<Date>,
    /// Last day included, through the end of that day.
    pub end: Option<Date>,
    /// Source prefix, or `""`/`"all"`.
    pub prefix: Option<String>,
    /// Status code as sent by the dashboard, or `""`/`"all"`.
    pub status: Option<String>,
    pub sort: SortMode,
}

impl FilterCriteria {
    pub fn builder() -> FilterCriteriaBuilder {
        FilterCriteriaBuilder::new()
    }

    pub fn has_date_range(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Prefix to match, with the "no constraint" spellings folded away.
    pub fn prefix_constraint(&self) -> Option<&str> {
        constraint(self.prefix.as_deref())
    }

    pub fn status_constraint(&self) -> Option<&str> {
        constraint(self.status.as_deref())
    }
}

fn constraint(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty() && *v != ALL)
}

#[derive(Default)]
pub struct FilterCriteriaBuilder {
    criteria: FilterCriteria,
}

impl FilterCriteriaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, date: Date) -> Self {
        self.criteria.start = Some(date);
        self
    }

    pub fn end(mut self, date: Date) -> Self {
        self.criteria.end = Some(date);
        self
    }

    pub fn prefix<S>(mut self, prefix: S) -> Self
    where
        S: Into<String>,
    {
        self.criteria.prefix = Some(prefix.into());
        self
    }

    pub fn status<S>(mut self, status: S) -> Self
    where
        S: Into<String>,
    {
        self.criteria.status = Some(status.into());
        self
    }

    pub fn sort(mut self, sort: SortMode) -> Self {
        self.criteria.sort = sort;
        self
    }

    pub fn build(self) -> FilterCriteria {
        self.criteria
    }
}
