use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_throttle_deferral")
        .depends_on(&["0001_initial_schema"])
        .operation(AddField::new(
            "harvest_jobs",
            Field::new("deferred_until", FieldType::Text),
        ))
        .operation(AddField::new(
            "source_policies",
            Field::new("last_swept_at", FieldType::Text),
        ))
}
