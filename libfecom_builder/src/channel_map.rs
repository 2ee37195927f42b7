// The commissioning crate is wired to the half-detector through two tables. The tracker
// table maps every electronic channel to one electrode of one drift cell:
// [slot, feast, channel] -> (cell, electrode)
// and the calorimeter table maps every calo channel to an optical module:
// [slot, channel] -> (side, column, row)
//
// The tracker mapping is also inverted per cell so that, starting from any one channel,
// the anode and both cathodes of the same cell can be found.
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use fxhash::FxHashMap;

use super::electronic_id::{
    generate_uuid, CellId, Electrode, ElectronicId, OpticalModuleId, TrackerGeomId,
};
use super::error::ChannelMapError;

const TRACKER_ENTRIES_PER_LINE: usize = 7; //slot, feast, channel, side, layer, row, electrode
const CALO_ENTRIES_PER_LINE: usize = 5; //slot, channel, side, column, row

/// The electronic channels wired to the three electrodes of a cell.
///
/// Partially instrumented cells leave some of these empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellChannels {
    pub anode: Option<ElectronicId>,
    pub bottom_cathode: Option<ElectronicId>,
    pub top_cathode: Option<ElectronicId>,
}

impl CellChannels {
    fn slot_mut(&mut self, electrode: &Electrode) -> &mut Option<ElectronicId> {
        match electrode {
            Electrode::Anode => &mut self.anode,
            Electrode::BottomCathode => &mut self.bottom_cathode,
            Electrode::TopCathode => &mut self.top_cathode,
        }
    }
}

fn read_table(path: &Path) -> Result<String, ChannelMapError> {
    if !path.exists() {
        return Err(ChannelMapError::BadFilePath(path.to_path_buf()));
    }
    let mut contents = String::new();
    let mut file = File::open(path)?;
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Iterate over the data rows of a table as (line number, entries), skipping the header
fn table_rows(contents: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    contents
        .lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx + 1, line.split_terminator(',').collect()))
}

/// ChannelMap holds the electronic to geometric mapping of the commissioning crate.
///
/// It is built once before any event processing and is read-only afterwards, so a single
/// map can be shared between workers.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    tracker_map: FxHashMap<u64, TrackerGeomId>,
    calo_map: FxHashMap<u64, OpticalModuleId>,
    cells: FxHashMap<CellId, CellChannels>,
}

impl ChannelMap {
    /// Create a new ChannelMap from the tracker and calorimeter table files
    pub fn new(tracker_path: &Path, calo_path: &Path) -> Result<Self, ChannelMapError> {
        let tracker_contents = read_table(tracker_path)?;
        let calo_contents = read_table(calo_path)?;
        Self::from_tables(&tracker_contents, &calo_contents)
    }

    /// Create a new ChannelMap from the contents of the two tables
    pub fn from_tables(tracker_table: &str, calo_table: &str) -> Result<Self, ChannelMapError> {
        let mut cm = ChannelMap::default();
        cm.build_tracker_mapping(tracker_table)?;
        cm.build_calo_mapping(calo_table)?;
        cm.initialize()?;
        spdlog::debug!(
            "ChannelMap built with {} tracker channels over {} cells and {} calo channels",
            cm.tracker_map.len(),
            cm.cells.len(),
            cm.calo_map.len()
        );
        Ok(cm)
    }

    fn build_tracker_mapping(&mut self, contents: &str) -> Result<(), ChannelMapError> {
        let mut slot: u16;
        let mut feast: u16;
        let mut channel: u16;
        let mut electrode: Electrode;
        let mut cell: CellId;

        for (line, entries) in table_rows(contents) {
            if entries.len() != TRACKER_ENTRIES_PER_LINE {
                return Err(ChannelMapError::BadFileFormat(line));
            }

            slot = entries[0].trim().parse()?;
            feast = entries[1].trim().parse()?;
            channel = entries[2].trim().parse()?;
            cell = CellId {
                side: entries[3].trim().parse()?,
                layer: entries[4].trim().parse()?,
                row: entries[5].trim().parse()?,
            };
            electrode = Electrode::from_str(entries[6].trim())?;

            let id = ElectronicId::tracker(electrode.channel_kind(), slot, feast, channel);
            if !id.is_valid() {
                return Err(ChannelMapError::InvalidChannel(id));
            }
            let uuid = generate_uuid(&slot, &feast, &channel);
            if self.tracker_map.contains_key(&uuid) {
                return Err(ChannelMapError::DuplicateChannel(id));
            }
            self.tracker_map
                .insert(uuid, TrackerGeomId { cell, electrode });
        }
        Ok(())
    }

    fn build_calo_mapping(&mut self, contents: &str) -> Result<(), ChannelMapError> {
        for (line, entries) in table_rows(contents) {
            if entries.len() != CALO_ENTRIES_PER_LINE {
                return Err(ChannelMapError::BadFileFormat(line));
            }

            let slot: u16 = entries[0].trim().parse()?;
            let channel: u16 = entries[1].trim().parse()?;
            let module = OpticalModuleId {
                side: entries[2].trim().parse()?,
                column: entries[3].trim().parse()?,
                row: entries[4].trim().parse()?,
            };

            let id = ElectronicId::calo(slot, channel);
            if !id.is_valid() {
                return Err(ChannelMapError::InvalidChannel(id));
            }
            let uuid = generate_uuid(&slot, &0, &channel);
            if self.calo_map.insert(uuid, module).is_some() {
                return Err(ChannelMapError::DuplicateChannel(id));
            }
        }
        Ok(())
    }

    /// Invert the tracker mapping into per-cell electrode channels
    fn initialize(&mut self) -> Result<(), ChannelMapError> {
        self.cells.clear();
        for (uuid, geom) in self.tracker_map.iter() {
            let slot = (uuid / 10_000) as u16;
            let feast = ((uuid / 100) % 100) as u16;
            let channel = (uuid % 100) as u16;
            let id = ElectronicId::tracker(geom.electrode.channel_kind(), slot, feast, channel);
            let cell_slot = self
                .cells
                .entry(geom.cell)
                .or_default()
                .slot_mut(&geom.electrode);
            if cell_slot.is_some() {
                return Err(ChannelMapError::DuplicateElectrode(geom.cell, geom.electrode));
            }
            *cell_slot = Some(id);
        }
        Ok(())
    }

    pub fn is_calo_channel_mapped(&self, id: &ElectronicId) -> bool {
        self.get_calo_geometric_id(id).is_some()
    }

    /// Get the optical module a calo channel is wired to.
    ///
    /// If returns None the channel does not exist in the map
    pub fn get_calo_geometric_id(&self, id: &ElectronicId) -> Option<&OpticalModuleId> {
        if !id.kind.is_tracker() {
            self.calo_map
                .get(&generate_uuid(&id.slot, &id.feast, &id.channel))
        } else {
            None
        }
    }

    /// Get the cell electrode a tracker channel is wired to.
    ///
    /// The lookup is on the hardware address only; the caller is expected to compare the
    /// kind of `id` with the electrode's channel kind.
    pub fn get_tracker_geometric_id(&self, id: &ElectronicId) -> Option<&TrackerGeomId> {
        self.tracker_map
            .get(&generate_uuid(&id.slot, &id.feast, &id.channel))
    }

    /// Get the anode and cathode channels of the cell a tracker channel belongs to
    pub fn get_cell_channels(&self, id: &ElectronicId) -> Option<&CellChannels> {
        self.get_tracker_geometric_id(id)
            .and_then(|geom| self.cells.get(&geom.cell))
    }

    pub fn n_tracker_channels(&self) -> usize {
        self.tracker_map.len()
    }

    pub fn n_calo_channels(&self) -> usize {
        self.calo_map.len()
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::electronic_id::ChannelKind;
    use std::io::Write;

    pub const TRACKER_TABLE: &str = "slot,feast,channel,side,layer,row,electrode
0,0,0,0,0,0,anode
0,0,1,0,0,0,bottom_cathode
0,0,2,0,0,0,top_cathode
0,1,5,0,3,7,anode
0,1,6,0,3,7,top_cathode
";
    pub const CALO_TABLE: &str = "slot,channel,side,column,row
0,11,0,4,2
";

    #[test]
    fn test_lookups() {
        let map = ChannelMap::from_tables(TRACKER_TABLE, CALO_TABLE).unwrap();
        assert_eq!(map.n_tracker_channels(), 5);
        assert_eq!(map.n_calo_channels(), 1);

        assert!(map.is_calo_channel_mapped(&ElectronicId::calo(0, 11)));
        assert!(!map.is_calo_channel_mapped(&ElectronicId::calo(0, 12)));
        assert_eq!(
            map.get_calo_geometric_id(&ElectronicId::calo(0, 11)),
            Some(&OpticalModuleId {
                side: 0,
                column: 4,
                row: 2
            })
        );

        let bottom = ElectronicId::tracker(ChannelKind::Cathodic, 0, 0, 1);
        let geom = map.get_tracker_geometric_id(&bottom).unwrap();
        assert_eq!(geom.electrode, Electrode::BottomCathode);
        assert_eq!(
            geom.cell,
            CellId {
                side: 0,
                layer: 0,
                row: 0
            }
        );
        let siblings = map.get_cell_channels(&bottom).unwrap();
        assert_eq!(
            siblings.anode,
            Some(ElectronicId::tracker(ChannelKind::Anodic, 0, 0, 0))
        );
        assert_eq!(
            siblings.top_cathode,
            Some(ElectronicId::tracker(ChannelKind::Cathodic, 0, 0, 2))
        );
    }

    #[test]
    fn test_partial_cell() {
        let map = ChannelMap::from_tables(TRACKER_TABLE, CALO_TABLE).unwrap();
        let anode = ElectronicId::tracker(ChannelKind::Anodic, 0, 1, 5);
        let siblings = map.get_cell_channels(&anode).unwrap();
        assert_eq!(siblings.anode, Some(anode));
        assert_eq!(siblings.bottom_cathode, None);
        assert!(siblings.top_cathode.is_some());
        assert!(map
            .get_cell_channels(&ElectronicId::tracker(ChannelKind::Anodic, 0, 1, 40))
            .is_none());
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let table = "header\n0,0,0,0,0,0,anode\n0,0,0,0,0,1,anode\n";
        match ChannelMap::from_tables(table, CALO_TABLE) {
            Err(ChannelMapError::DuplicateChannel(_)) => (),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_electrode_rejected() {
        let table = "header\n0,0,0,0,0,0,anode\n0,0,1,0,0,0,anode\n";
        match ChannelMap::from_tables(table, CALO_TABLE) {
            Err(ChannelMapError::DuplicateElectrode(_, Electrode::Anode)) => (),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_bad_format() {
        let table = "header\n0,0,0,0,0,anode\n";
        match ChannelMap::from_tables(table, CALO_TABLE) {
            Err(ChannelMapError::BadFileFormat(2)) => (),
            other => panic!("unexpected result {other:?}"),
        }
        let table = "header\n0,0,0,0,0,0,grid\n";
        assert!(matches!(
            ChannelMap::from_tables(table, CALO_TABLE),
            Err(ChannelMapError::BadKeyword(_))
        ));
    }

    #[test]
    fn test_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let tracker_path = dir.path().join("mapping_tracker.csv");
        let calo_path = dir.path().join("mapping_calo.csv");
        File::create(&tracker_path)
            .unwrap()
            .write_all(TRACKER_TABLE.as_bytes())
            .unwrap();
        File::create(&calo_path)
            .unwrap()
            .write_all(CALO_TABLE.as_bytes())
            .unwrap();
        let map = ChannelMap::new(&tracker_path, &calo_path).unwrap();
        assert_eq!(map.n_tracker_channels(), 5);

        let missing = dir.path().join("nope.csv");
        assert!(matches!(
            ChannelMap::new(&missing, &calo_path),
            Err(ChannelMapError::BadFilePath(_))
        ));
    }
}
