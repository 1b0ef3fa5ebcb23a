use std::fs;
use std::path::Path;

use rusty_treeview::data::loader::CancelToken;
use rusty_treeview::data::{
    DataMatrix, DataModel, DataStart, DataValue, FileKind, FileSet, LabelInfo, LabelView,
    LoadSettings, ModelWriter, SettingsStore, TreeInfo,
};
use rusty_treeview::error::LoadErrorKind;

fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|s| s.to_string()).collect()
}

fn sample_model() -> DataModel {
    let rows = LabelInfo::from_parts(
        strings(&["GID", "YORF", "NAME", "GWEIGHT"]),
        vec![
            strings(&["GENE0X", "YAL001C", "TFC3", "1"]),
            strings(&["GENE1X", "YAL002W", "VPS8", "1"]),
            strings(&["GENE2X", "YAL003W", "EFB1", "0.5"]),
        ],
    );
    let cols = LabelInfo::from_parts(
        strings(&["NAME", "AID", "EWEIGHT"]),
        vec![
            strings(&["heat 0", "ARRY0X", "1"]),
            strings(&["heat 10", "ARRY1X", "1"]),
        ],
    );
    let matrix = DataMatrix::from_rows(vec![
        vec![0.12, -1.5],
        vec![f64::NAN, 2.25],
        vec![3.0, 1e-5],
    ]);
    let mut model = DataModel::from_stores(rows, cols, matrix);
    model.set_gtr(TreeInfo::from_rows(vec![
        strings(&["NODE1X", "GENE0X", "GENE1X", "0.91"]),
        strings(&["NODE2X", "NODE1X", "GENE2X", "0.42"]),
    ]));
    model.set_atr(TreeInfo::from_rows(vec![strings(&[
        "NODE1X", "ARRY0X", "ARRY1X", "0.77",
    ])]));
    model
}

fn load(path: &Path, settings: LoadSettings) -> (DataModel, LoadSettings) {
    let mut model = DataModel::new();
    let settings = model
        .load_new(FileSet::from_path(path), settings, &(), &CancelToken::new())
        .unwrap();
    (model, settings)
}

fn assert_same_labels(a: &LabelInfo, b: &LabelInfo) {
    assert_eq!(a.label_types(), b.label_types());
    assert_eq!(a.label_array(), b.label_array());
}

fn assert_same_values(a: &DataModel, b: &DataModel) {
    assert_eq!(a.n_rows(), b.n_rows());
    assert_eq!(a.n_cols(), b.n_cols());
    for r in 0..a.n_rows() {
        for c in 0..a.n_cols() {
            assert_eq!(a.value(c, r), b.value(c, r), "cell ({c}, {r})");
        }
    }
}

#[test]
fn write_then_load_gives_the_same_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yeast.cdt");
    let mut original = sample_model();
    let report = ModelWriter::new(FileSet::from_path(&path)).write_all(&mut original);
    assert!(report.is_ok());
    assert!(report.wrote(FileKind::Cdt) && report.wrote(FileKind::Gtr) && report.wrote(FileKind::Atr));

    let (loaded, settings) = load(&path, LoadSettings::default());

    assert_eq!(settings.data_start, Some(DataStart::new(3, 4)));
    assert_same_labels(original.row_labels(), loaded.row_labels());
    assert_same_labels(original.col_labels(), loaded.col_labels());
    assert_same_values(&original, &loaded);
    assert_same_labels(original.gtr().unwrap().labels(), loaded.gtr().unwrap().labels());
    assert_same_labels(original.atr().unwrap().labels(), loaded.atr().unwrap().labels());

    assert!(loaded.gid_found() && loaded.aid_found());
    assert!(loaded.gweight_found() && loaded.eweight_found());
    assert!(!loaded.is_modified());
    assert_eq!(loaded.row_labels().label_index("GENE2X"), Some(2));
    assert_eq!(loaded.col_labels().label_index("ARRY1X"), Some(1));
    assert_eq!(loaded.row_labels().label_by_name(1, "NAME"), Some("VPS8"));

    let base = loaded.matrix().base_values().unwrap();
    assert_eq!(base.skipped, 1);
    assert_eq!(base.min, -1.5);
    assert_eq!(base.max, 3.0);
}

#[test]
fn stored_settings_skip_detection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yeast.cdt");
    let mut original = sample_model();
    ModelWriter::new(FileSet::from_path(&path)).write_all(&mut original);

    let (_, detected) = load(&path, LoadSettings::default());
    assert_eq!(detected.row_label_types, strings(&["GID", "YORF", "NAME", "GWEIGHT"]));
    assert_eq!(detected.col_label_types, strings(&["NAME", "AID", "EWEIGHT"]));

    let store_path = dir.path().join("settings.json");
    let file_set = FileSet::from_path(&path);
    let mut store = SettingsStore::default();
    store.insert(&file_set, detected.clone());
    store.save(&store_path).unwrap();

    let stored = SettingsStore::load(&store_path).unwrap().get(&file_set).cloned().unwrap();
    let (reloaded, again) = load(&path, stored);
    assert_eq!(again, detected);
    assert_same_values(&original, &reloaded);
}

#[test]
fn missing_tokens_become_missing_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.txt");
    fs::write(
        &path,
        "ID\tNAME\tA\tB\tC\n\
         G1\tx\t1\tNA\t2E\n\
         \n\
         G2\ty\tN/A\tfoo\t3\n\
         G3\tz\tNaN\tMISSING\t4\n",
    )
    .unwrap();

    let (model, settings) = load(&path, LoadSettings::default());
    assert_eq!(settings.data_start, Some(DataStart::new(1, 2)));
    assert_eq!((model.n_rows(), model.n_cols()), (3, 3));
    assert_eq!(model.value(0, 0), DataValue::Value(1.0));
    assert_eq!(model.value(1, 0), DataValue::Missing);
    assert_eq!(model.value(2, 0), DataValue::Value(2.0));
    assert_eq!(model.value(0, 1), DataValue::Missing);
    assert_eq!(model.value(1, 1), DataValue::Missing);
    assert_eq!(model.value(0, 2), DataValue::Missing);
    assert_eq!(model.value(1, 2), DataValue::Missing);
    assert!(!model.gid_found());

    let base = model.matrix().base_values().unwrap();
    assert_eq!((base.min, base.max), (1.0, 4.0));
    assert_eq!(base.mean, 2.5);
    assert_eq!(base.median, 2.5);
    assert_eq!(base.skipped, 5);
}

#[test]
fn missing_and_empty_tree_files_are_not_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clustered.cdt");
    fs::write(
        &path,
        "GID\tNAME\tA\n\
         AID\t\tARRY0X\n\
         GENE0X\ta\t1.0\n\
         GENE1X\tb\t2.0\n",
    )
    .unwrap();

    let (model, settings) = load(&path, LoadSettings::default());
    assert_eq!(settings.data_start, Some(DataStart::new(2, 2)));
    assert!(!model.gid_found() && !model.aid_found());
    assert!(model.gtr().is_none() && model.atr().is_none());
    assert_eq!(model.row_labels().label_index("GENE1X"), Some(1));

    fs::write(dir.path().join("clustered.atr"), "").unwrap();
    fs::write(dir.path().join("clustered.gtr"), "\n\n").unwrap();
    let (model, _) = load(&path, settings.clone());
    assert!(!model.gid_found() && !model.aid_found());
    assert!(model.gtr().is_none() && model.atr().is_none());
    assert_eq!(model.col_labels().label_index("ARRY0X"), Some(0));

    fs::write(
        dir.path().join("clustered.gtr"),
        "NODE1X\tGENE0X\tGENE1X\t0.8\n",
    )
    .unwrap();
    let (model, _) = load(&path, settings);
    assert!(model.gid_found() && !model.aid_found());
    let gtr = model.gtr().unwrap();
    assert_eq!(gtr.num_nodes(), 1);
    assert_eq!(gtr.node_by_id("NODE1X").unwrap().right, "GENE1X");
}

#[test]
fn failed_load_leaves_the_model_reset() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.cdt");
    let mut original = sample_model();
    ModelWriter::new(FileSet::from_path(&good)).write_all(&mut original);

    let (mut model, _) = load(&good, LoadSettings::default());
    assert!(model.is_loaded());

    let err = model
        .load_new(
            FileSet::from_path(&dir.path().join("absent.cdt")),
            LoadSettings::default(),
            &(),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), LoadErrorKind::CdtParse);
    assert!(err.path().ends_with("absent.cdt"));
    assert!(!model.is_loaded());
    assert_eq!(model.n_rows(), 0);
    assert!(model.source().is_none());
}

#[test]
fn incremental_save_rewrites_only_what_changed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yeast.cdt");
    let mut original = sample_model();
    ModelWriter::new(FileSet::from_path(&path)).write_all(&mut original);

    let (mut model, settings) = load(&path, LoadSettings::default());
    let writer = ModelWriter::for_model(&model).unwrap();
    assert!(writer.write_incremental(&mut model).written.is_empty());

    assert!(model.reorder_rows(&[2, 0, 1]));
    assert!(model.row_labels_mut().set_label(0, "NAME", "EFB1-renamed"));
    let report = writer.write_incremental(&mut model);
    assert_eq!(report.written.len(), 1);
    assert!(report.wrote(FileKind::Cdt));
    assert!(!model.is_modified());

    let (reloaded, _) = load(&path, settings);
    assert_eq!(reloaded.row_labels().label(0, 0), Some("GENE2X"));
    assert_eq!(reloaded.row_labels().label_by_name(0, "NAME"), Some("EFB1-renamed"));
    assert_eq!(reloaded.value(0, 0), DataValue::Value(3.0));
    assert_eq!(reloaded.row_labels().label_index("GENE0X"), Some(1));
}

#[test]
fn saving_after_append_keeps_only_own_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yeast.cdt");
    let mut original = sample_model();
    ModelWriter::new(FileSet::from_path(&path)).write_all(&mut original);

    let (mut model, settings) = load(&path, LoadSettings::default());
    let other = sample_model();
    model.append(&other).unwrap();
    assert_eq!(model.n_cols(), 5);
    assert!(model.row_labels_mut().set_label(1, "NAME", "VPS8-edited"));

    let writer = ModelWriter::for_model(&model).unwrap();
    assert!(writer.write_incremental(&mut model).wrote(FileKind::Cdt));

    let (reloaded, _) = load(&path, settings);
    assert_eq!(reloaded.n_cols(), 2);
    assert_eq!(reloaded.col_labels().num_labels(), 2);
    assert_eq!(reloaded.row_labels().label_by_name(1, "NAME"), Some("VPS8-edited"));
    assert_same_values(&original, &reloaded);
}

#[test]
fn quoted_comma_files_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quoted.csv");
    fs::write(
        &path,
        "ORF,NAME,\"day 1\",\"day 2\"\n\
         YAL001C,\"TFC3, subunit\",0.5,1e\n",
    )
    .unwrap();

    let mut settings = LoadSettings::with_delimiter(',');
    settings.parse_quoted = true;
    let (model, _) = load(&path, settings);
    assert_eq!(model.row_labels().label_by_name(0, "NAME"), Some("TFC3, subunit"));
    assert_eq!(model.col_labels().label(1, 0), Some("day 2"));
    assert_eq!(model.value(1, 0), DataValue::Value(1.0));
}
