use crate::reading::{Field, Reading};

/// How many of the most recent readings a chart shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Horizon {
    Last20,
    #[default]
    Last200,
    Last2000,
}

impl Horizon {

    pub fn count(&self) -> usize {
        match self {
            Horizon::Last20 => 20,
            Horizon::Last200 => 200,
            Horizon::Last2000 => 2000,
        }
    }

    /// The selectable horizon for a reading count, if it is one
    pub fn from_count(count: usize) -> Option<Horizon> {
        match count {
            20 => Some(Horizon::Last20),
            200 => Some(Horizon::Last200),
            2000 => Some(Horizon::Last2000),
            _ => None,
        }
    }
}

/// The most recent `horizon` readings of a newest-first buffer, oldest first
pub fn window(buffer: &[Reading], horizon: usize) -> Vec<Reading> {
    let take = horizon.min(buffer.len());
    buffer[..take].iter().rev().cloned().collect()
}

/// The newest reading; what every "current value" display shows
pub fn latest(buffer: &[Reading]) -> Option<&Reading> {
    buffer.first()
}

/// Precision of the time-of-day labels on the category axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPrecision {
    #[default]
    Seconds,
    SubSeconds,
}

/// One point of a chart series
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub label: String,
    pub value: f64,
}

/// Time of day of a `YYYY-MM-DDTHH:MM:SS[.fff]` timestamp
pub fn time_label(timestamp: &str, precision: LabelPrecision) -> String {
    let time = timestamp.get(11..).unwrap_or(timestamp);
    let end = match precision {
        LabelPrecision::Seconds => 8,
        LabelPrecision::SubSeconds => time
            .char_indices()
            .find(|(i, c)| *i >= 8 && !(c.is_ascii_digit() || *c == '.'))
            .map_or(time.len(), |(i, _)| i),
    };
    time.get(..end).unwrap_or(time).to_string()
}

/// Plot `field` of chronologically ordered readings against their time of day
pub fn to_series(windowed: &[Reading], field: Field, precision: LabelPrecision) -> Vec<SeriesPoint> {
    windowed.iter()
        .map(|reading| SeriesPoint {
            label: time_label(&reading.timestamp, precision),
            value: field.value_of(reading),
        })
        .collect()
}

/// Several fields of the same window sharing one label axis
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chart {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub field: Field,
    pub values: Vec<f64>,
}

impl Chart {

    pub fn build(windowed: &[Reading], fields: &[Field], precision: LabelPrecision) -> Chart {
        Chart {
            labels: windowed.iter().map(|r| time_label(&r.timestamp, precision)).collect(),
            datasets: fields.iter()
                .map(|field| Dataset {
                    field: *field,
                    values: windowed.iter().map(|r| field.value_of(r)).collect(),
                })
                .collect(),
        }
    }

    /// "No data" state: nothing to plot
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
